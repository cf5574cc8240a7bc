mod block;
mod category;

pub use block::{Block, BlockCategory, CategoryTotal};
pub use category::{
    Category, CategoryUpdate, DEFAULT_CATEGORY_COLOR, DEFAULT_CATEGORY_NAME, PALETTE,
};

#[cfg(test)]
mod tests;
