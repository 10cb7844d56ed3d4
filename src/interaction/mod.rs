pub mod click;
pub mod fill;
pub mod wait;
