/// Pastel palette offered by the category editor. The first entry is the
/// color of the seeded "General" category.
pub const PALETTE: &[&str] = &[
    "#90A4AE", "#EF9A9A", "#F48FB1", "#CE93D8", "#B39DDB", "#9FA8DA", "#90CAF9", "#80DEEA",
    "#80CBC4", "#A5D6A7", "#FFE082", "#FFAB91",
];

pub const DEFAULT_CATEGORY_NAME: &str = "General";
pub const DEFAULT_CATEGORY_COLOR: &str = "#90A4AE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
    pub color: String,
    pub sort_order: i64,
    pub include_in_totals: bool,
}

impl Category {
    /// A new, unsaved category. The database assigns `sort_order` on insert.
    pub fn new(name: String, color: String) -> Self {
        Self {
            id: None,
            name,
            color,
            sort_order: 0,
            include_in_totals: true,
        }
    }

    /// Find a category by ID in a slice.
    pub fn find_by_id(categories: &[Category], id: i64) -> Option<&Category> {
        categories.iter().find(|c| c.id == Some(id))
    }

    pub fn is_palette_color(color: &str) -> bool {
        PALETTE.iter().any(|p| p.eq_ignore_ascii_case(color))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Partial edit of a category; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub include_in_totals: Option<bool>,
}

impl CategoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.color.is_none() && self.include_in_totals.is_none()
    }
}
