pub mod pipeline;
pub mod work_item;
