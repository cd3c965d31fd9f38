use burn::{config::Config, optim::AdamConfig};
use {argh::FromArgs, std::fmt::Debug};

pub const VGG_WEIGHTS_FILE: &str = "./assets/pretrained_models/vgg16-fc-reduced";
pub const CHECKPOINTS_DIR: &str = "./artifacts/checkpoints/";
pub const TRAIN_LOG_PATH: &str = "./artifacts/training_log.csv";
pub const WIDTH: usize = 512;
pub const HEIGHT: usize = 512;

/// Per-channel dataset mean (RGB). Subtracted from every image before the
/// channels are reordered to BGR, which is the ordering the converted
/// pretrained VGG16 weights expect.
pub const MEAN_COLOR: [f32; 3] = [123.0, 117.0, 104.0];

/// Inverse-variance style scale factors used when encoding and decoding box
/// offsets against the default boxes: `[cx, cy, w, h]`.
pub const VARIANCES: [f32; 4] = [0.1, 0.1, 0.2, 0.2];

/// “SSD: Single Shot MultiBox Detector”
/// Authors: Wei Liu, Dragomir Anguelov, Dumitru Erhan, Christian Szegedy,
///          Scott Reed, Cheng-Yang Fu, Alexander C. Berg
/// Link (official): https://arxiv.org/abs/1512.02325
///
/// The SSD512 variant trained here targets small benthic animals, so the
/// detection layers reach down to a stride-4 feature map and the anchor
/// scales start at 0.04 instead of the paper's 0.1 (see anchors::SCALES).
///
/// Training runs with Adam at a fixed 1e-4 learning rate; `lr_decay_epoch`
/// can drop the rate by `lr_decay_factor` late in the run if the loss
/// plateaus (0 leaves the schedule constant).
#[derive(Config)]
pub struct TrainingConfig {
    pub optimizer: AdamConfig,
    #[config(default = 120)]
    pub num_epochs: usize,
    #[config(default = 4)]
    pub batch_size: usize,
    #[config(default = 500)]
    pub steps_per_epoch: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 1)]
    pub seed: u64,
    #[config(default = 0.0001)]
    pub learning_rate: f64,
    #[config(default = 0)]
    pub lr_decay_epoch: usize,
    #[config(default = 0.1)]
    pub lr_decay_factor: f64,
}

impl TrainingConfig {
    /// Learning rate for a given 1-based epoch.
    pub fn learning_rate_for(&self, epoch: usize) -> f64 {
        if self.lr_decay_epoch > 0 && epoch >= self.lr_decay_epoch {
            self.learning_rate * self.lr_decay_factor
        } else {
            self.learning_rate
        }
    }
}

#[derive(FromArgs, PartialEq, Debug)]
/// Top-level command.
pub struct SeadetCmd {
    #[argh(subcommand)]
    pub commands: Commands,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum Commands {
    Infer(SubCommandInfer),
    Train(SubCommandTrain),
}

#[derive(FromArgs, PartialEq, Debug)]
/// Run inference on a single image using a trained checkpoint
#[argh(subcommand, name = "infer")]
pub struct SubCommandInfer {
    #[argh(option)]
    /// image path to run inference on
    pub p: String,
    #[argh(option)]
    /// model file path to use
    pub m: String,
    #[argh(option)]
    /// iou overlap - how much do predicted boxes need to overlap to be considered a single box
    pub i: Option<f32>,
    #[argh(option)]
    /// classification confidence level score
    pub c: Option<f32>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Train an SSD512 model on a VOC-layout underwater dataset
#[argh(subcommand, name = "train")]
pub struct SubCommandTrain {
    #[argh(option)]
    /// dataset root (contains JPEGImages/, Annotations/ and ImageSets/Main/)
    pub r: String,
    #[argh(option)]
    /// epoch number to resume training from, default 0 (fresh start)
    pub c: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_schedule_by_default() {
        let config = TrainingConfig::new(AdamConfig::new());

        assert_eq!(config.learning_rate_for(1), 0.0001);
        assert_eq!(config.learning_rate_for(119), 0.0001);
    }

    #[test]
    fn decay_boundary_drops_rate() {
        let config = TrainingConfig::new(AdamConfig::new()).with_lr_decay_epoch(100);

        assert_eq!(config.learning_rate_for(99), 0.0001);
        assert!((config.learning_rate_for(100) - 0.00001).abs() < 1e-12);
    }
}
