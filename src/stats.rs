use crate::config::TRAIN_LOG_PATH;
use burn::tensor::cast::ToElement;
use burn::tensor::{Tensor, backend::Backend};
use chrono::Utc;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// Training-loop bookkeeping: a live console progress line per batch and
/// one CSV row per epoch (epoch, mean train loss, mean validation loss,
/// learning rate, wall seconds). The CSV opens in append mode so an
/// interrupted run resumed from a checkpoint keeps logging into the same
/// history.
pub struct Stats {
    stopwatch: Instant,
    batch_size: usize,
    l: f32,
    iterations: usize,
    log_output: String,
    csv: csv::Writer<File>,
}

impl Stats {
    pub fn new(batch_size: usize) -> Self {
        Self::new_with_path(batch_size, TRAIN_LOG_PATH)
    }

    pub fn new_with_path(batch_size: usize, path: &str) -> Self {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let write_header = !Path::new(path).exists();

        let f_handle = File::options()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();

        let mut csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(f_handle);

        if write_header {
            csv.write_record(["epoch", "loss", "val_loss", "lr", "seconds"])
                .unwrap();
            csv.flush().unwrap();
        }

        log::info!(
            "training session started at {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );

        Stats {
            stopwatch: Instant::now(),
            batch_size,
            l: 0.0,
            iterations: 0,
            log_output: String::new(),
            csv,
        }
    }

    /// Accumulates a batch loss and repaints the console progress line.
    pub fn update<B: Backend>(
        &mut self,
        loss: Tensor<B, 2>,
        iteration: usize,
        name: &str,
        epoch: usize,
    ) {
        if iteration == 0 {
            return;
        }

        self.l += loss.clone().sum().into_scalar().to_f32();
        self.iterations = iteration;

        let elapsed = self.stopwatch.elapsed().as_secs();

        self.log_output = format!(
            "{},E:{:<6.3},I:{:<6.3},L:{:<6.3},T:{:<}m{:<}s\r",
            name,
            epoch,
            iteration * self.batch_size,
            self.l / iteration as f32,
            (elapsed / 60),
            elapsed % 60
        );

        print!("{}", &self.log_output);
        std::io::stdout().flush().unwrap();
    }

    /// Ends a train or validation phase and returns its mean batch loss,
    /// resetting the accumulator for the next phase.
    pub fn end_phase(&mut self) -> f32 {
        let avg = if self.iterations > 0 {
            self.l / self.iterations as f32
        } else {
            0.0
        };

        println!();

        self.l = 0.0;
        self.iterations = 0;
        self.log_output.clear();

        avg
    }

    /// Appends the epoch summary row to the CSV log and restarts the epoch
    /// stopwatch.
    pub fn write_epoch(&mut self, epoch: usize, loss: f32, val_loss: f32, lr: f64) {
        let elapsed = self.stopwatch.elapsed().as_secs();

        self.csv
            .write_record([
                epoch.to_string(),
                format!("{loss:.4}"),
                format!("{val_loss:.4}"),
                lr.to_string(),
                elapsed.to_string(),
            ])
            .unwrap();
        self.csv.flush().unwrap();

        self.stopwatch = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{NdArray, ndarray::NdArrayDevice},
        tensor::Tensor,
    };
    use std::fs;

    type B = NdArray<f32>;

    fn temp_log(name: &str) -> String {
        std::env::temp_dir()
            .join(name)
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_update_formats_log_output() {
        let path = temp_log("seadet-stats-update.csv");
        let _ = fs::remove_file(&path);

        let device = &NdArrayDevice::default();
        let mut stats = Stats::new_with_path(4, &path);

        // Tensor of shape [1,4] filled with ones → sum = 4.0
        let loss: Tensor<B, 2> = Tensor::ones([1, 4], device);

        stats.update(loss.clone(), 2, "Valid", 3);

        // Expected: iteration * batch_size = 8, avg loss = 4 / 2 = 2.0
        assert!(stats.log_output.contains("Valid"));
        assert!(stats.log_output.contains("E:3"));
        assert!(stats.log_output.contains("I:8"));
        assert!(stats.log_output.contains("L:2"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_update_ignores_iteration_zero() {
        let path = temp_log("seadet-stats-iter0.csv");
        let _ = fs::remove_file(&path);

        let device = &NdArrayDevice::default();
        let mut stats = Stats::new_with_path(4, &path);

        let loss: Tensor<B, 2> = Tensor::ones([1, 4], device);
        stats.update(loss, 0, "Train", 1);

        assert_eq!(stats.log_output, "");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_end_phase_returns_mean_and_resets() {
        let path = temp_log("seadet-stats-phase.csv");
        let _ = fs::remove_file(&path);

        let device = &NdArrayDevice::default();
        let mut stats = Stats::new_with_path(2, &path);

        let loss: Tensor<B, 2> = Tensor::ones([1, 2], device);

        stats.update(loss.clone(), 1, "Train", 1);
        stats.update(loss, 2, "Train", 1);

        // two updates of summed loss 2.0 each, over 2 iterations
        let avg = stats.end_phase();
        assert!((avg - 2.0).abs() < 1e-6);

        // accumulator reset
        assert_eq!(stats.end_phase(), 0.0);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_write_epoch_appends_csv_rows() {
        let path = temp_log("seadet-stats-epoch.csv");
        let _ = fs::remove_file(&path);

        let mut stats = Stats::new_with_path(4, &path);
        stats.write_epoch(1, 9.1234, 10.5678, 0.0001);
        stats.write_epoch(2, 8.0, 9.0, 0.0001);

        let contents = fs::read_to_string(&path).unwrap();

        assert!(contents.starts_with("epoch,loss,val_loss,lr,seconds"));
        assert!(contents.contains("1,9.1234,10.5678,0.0001,"));
        assert!(contents.contains("2,8.0000,9.0000,0.0001,"));

        let _ = fs::remove_file(&path);
    }
}
