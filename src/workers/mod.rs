pub mod segments;
pub mod video_processor;
