pub mod category;
pub mod category_node;
