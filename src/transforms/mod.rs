pub mod clean_boxes;
pub mod crop;
pub mod flip;
pub mod normalize;
pub mod photometric;
pub mod pipeline;
pub mod resize;
pub mod save_image;
pub mod zoom_out;
