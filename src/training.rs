use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use glob::glob;

use crate::config::{CHECKPOINTS_DIR, TrainingConfig};
use crate::data::{BatchType, SSDBatcher};
use crate::dataset::VocDataSet;
use crate::labels::ClassMap;
use crate::loss::calculate_loss;
use crate::models::ssd::SSD;
use crate::stats::Stats;
use burn::data::dataloader::DataLoaderBuilder;
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::{backend::AutodiffBackend, cast::ToElement};

fn create_dir(dir: &str) {
    if std::fs::exists(dir).unwrap() {
        println!("Directory {} exists, remove? (y)", dir);
        let mut response = String::new();

        io::stdin()
            .read_line(&mut response)
            .expect("Failed to read line");

        if response.contains("y") {
            std::fs::remove_dir_all(dir).ok();
        }
    } else {
        std::fs::create_dir_all(dir).ok();
    }
}

/// Stem of the checkpoint file for an epoch. The training and validation
/// losses ride along in the name, so a directory listing doubles as a
/// training summary.
fn checkpoint_stem(epoch: usize, loss: f32, val_loss: f32) -> String {
    format!("ssd512-epoch-{epoch:03}_loss-{loss:.4}_val_loss-{val_loss:.4}")
}

/// Finds the saved checkpoint of an epoch regardless of the loss values
/// embedded in its name.
fn find_checkpoint(dir: &str, epoch: usize) -> Result<PathBuf> {
    let pattern = format!(
        "{}ssd512-epoch-{epoch:03}_*.mpk",
        if dir.ends_with('/') {
            dir.to_string()
        } else {
            format!("{dir}/")
        }
    );

    glob(&pattern)?
        .flatten()
        .next()
        .with_context(|| format!("no checkpoint for epoch {epoch} matches {pattern}"))
}

/// Runs supervised training of the SSD512 detector.
///
/// Per epoch: up to `steps_per_epoch` training batches through the
/// augmentation pipeline, a full pass over the validation split, one CSV
/// log row, and a checkpoint named after the epoch and both mean losses.
/// A non-finite training loss aborts the run before the poisoned weights
/// reach disk.
pub fn train<B: AutodiffBackend>(
    config: TrainingConfig,
    device: &B::Device,
    mut checkpoint_start: usize,
    data_root: String,
) -> Result<()> {
    let classes = ClassMap::new();

    // Load a model checkpoint if the user has specified to resume from an
    // epoch other than 0

    let mut model = if checkpoint_start == 0 {
        checkpoint_start = 1;
        create_dir(CHECKPOINTS_DIR);
        SSD::<B>::new(device, None, classes.count())
    } else {
        let cp_path = find_checkpoint(CHECKPOINTS_DIR, checkpoint_start)?;

        let record = CompactRecorder::new()
            .load(cp_path.clone(), device)
            .unwrap_or_else(|_| panic!("Couldn't load trained model at {}", cp_path.display()));
        log::info!("Resuming from checkpoint {}", cp_path.display());

        // Continue with the epoch after the loaded one
        checkpoint_start += 1;

        SSD::<B>::new(device, Some(record), classes.count())
    };

    B::seed(config.seed);

    let mut optim = config.optimizer.init();

    let batcher_train = SSDBatcher::new(BatchType::Train);
    let batcher_valid = SSDBatcher::new(BatchType::Valid);

    let ds_train = VocDataSet::trainval(&data_root, &classes)?;
    let ds_valid = VocDataSet::test(&data_root, &classes)?;

    log::info!("Number of images in the training dataset: {}", ds_train.len());
    log::info!("Number of images in the validation dataset: {}", ds_valid.len());

    let dataloader_train = DataLoaderBuilder::<B, _, _>::new(batcher_train)
        .set_device(device.clone())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(ds_train);

    // The validation split is never shuffled, so its loss curve is
    // comparable run to run
    let dataloader_test = DataLoaderBuilder::<B::InnerBackend, _, _>::new(batcher_valid)
        .set_device(device.clone())
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .build(ds_valid);

    let mut stats = Stats::new(config.batch_size);

    for epoch in checkpoint_start..config.num_epochs + 1 {
        let lr = config.learning_rate_for(epoch);

        for (iteration, batch) in dataloader_train.iter().enumerate() {
            if iteration >= config.steps_per_epoch {
                break;
            }

            let (class_logits, box_logits, outputs) = model.forward(batch.images.clone());

            let (loss, _) = calculate_loss(class_logits, box_logits, outputs, &batch);

            // loss is an accumulation relative to batch size so divide by this
            let loss = loss / config.batch_size.to_f32();

            if loss.clone().is_nan().int().sum().into_scalar().to_i32() > 0 {
                anyhow::bail!(
                    "training loss went non-finite at epoch {epoch}, iteration {iteration}; stopping before saving"
                );
            }

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);

            stats.update(loss, iteration, "Train", epoch);
        }

        let train_loss = stats.end_phase();

        let m_valid = model.valid();

        for (iteration, batch) in dataloader_test.iter().enumerate() {
            let (class_logits, box_logits, outputs) = m_valid.forward(batch.images.clone());

            let (loss, _targets) = calculate_loss(class_logits, box_logits, outputs, &batch);

            let loss = loss.div_scalar(config.batch_size.to_f32());

            stats.update(loss, iteration, "Valid", epoch);
        }

        let val_loss = stats.end_phase();

        stats.write_epoch(epoch, train_loss, val_loss, lr);

        model
            .clone()
            .save_file(
                format!(
                    "{CHECKPOINTS_DIR}{}",
                    checkpoint_stem(epoch, train_loss, val_loss)
                ),
                &CompactRecorder::new(),
            )
            .expect("Trained model should be saved successfully");
    }

    Ok(())
}
