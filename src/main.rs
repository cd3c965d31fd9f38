use burn::{backend::Autodiff, backend::libtorch::LibTorch, config::Config};
use seadet::{
    config::{Commands, SeadetCmd, TrainingConfig},
    inference,
    labels::ClassMap,
    training,
};

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    type AutoDiffBackend = Autodiff<LibTorch>;
    let device = burn::backend::libtorch::LibTorchDevice::Cuda(0);

    let cli_cmd: SeadetCmd = argh::from_env();
    let class_map = ClassMap::new();

    match cli_cmd.commands {
        Commands::Infer(sub_command_infer) => {
            let image_path = &sub_command_infer.p;
            let model_path = &sub_command_infer.m;
            let iou_overlap_thresh = &sub_command_infer.i.unwrap_or(0.45);
            let cls_conf_thresh = &sub_command_infer.c.unwrap_or(0.5);

            inference::infer::<LibTorch>(
                image_path,
                model_path,
                &class_map,
                &device,
                iou_overlap_thresh,
                cls_conf_thresh,
            );
        }
        Commands::Train(sub_command_train) => {
            let checkpoint = sub_command_train.c.unwrap_or(0);
            let data_root = sub_command_train.r;
            let config = TrainingConfig::load("./config/training_config.json")
                .expect("Config file ./config/training_config.json should exist");
            training::train::<AutoDiffBackend>(config, &device, checkpoint, data_root)?;
        }
    };

    Ok(())
}
