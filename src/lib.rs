#![recursion_limit = "256"]

pub mod anchors;
pub mod broadcast;
pub mod config;
pub mod data;
pub mod dataset;
pub mod debug;
pub mod inference;
pub mod labels;
pub mod layers;
pub mod loss;
pub mod models;
pub mod nms;
pub mod stats;
pub mod training;
pub mod transforms;
