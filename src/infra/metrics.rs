// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records DPO training statistics to a CSV file.
//
// Metrics recorded per logged step:
//   - step, epoch
//   - loss:            DPO loss of the batch
//   - chosen_reward:   mean β·log(π/π_ref) of the chosen responses
//   - rejected_reward: mean β·log(π/π_ref) of the rejected responses
//   - reward_margin:   chosen_reward - rejected_reward
//   - accuracy:        fraction of pairs whose chosen reward is higher
//   - chosen_log_ratio / rejected_log_ratio:
//                      the same means without the β factor,
//                      mean log(π/π_ref) in nats
//
// Output file: {metrics_dir}/metrics.csv
//
// How to read the metrics:
//   - At step 1 the policy equals the reference: rewards are 0,
//     the sigmoid loss is ln 2 ≈ 0.6931 and accuracy is 0
//   - A healthy run pushes reward_margin up and loss down
//   - Both rewards drifting far negative means the policy is
//     lowering every likelihood, not just the rejected ones

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

const CSV_HEADER: &str =
    "step,epoch,loss,chosen_reward,rejected_reward,reward_margin,accuracy,chosen_log_ratio,rejected_log_ratio";

/// Statistics of one optimizer step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepMetrics {
    pub step:            usize,
    pub loss:            f64,
    pub chosen_reward:   f64,
    pub rejected_reward: f64,
    pub reward_margin:   f64,
    pub accuracy:        f64,
    /// `chosen_reward / beta`
    pub chosen_log_ratio:   f64,
    /// `rejected_reward / beta`
    pub rejected_log_ratio: f64,
}

impl StepMetrics {
    /// Aggregate per-pair implicit rewards (already scaled by `beta`)
    /// into batch statistics.
    pub fn compute(
        step:             usize,
        loss:             f64,
        beta:             f64,
        chosen_rewards:   &[f64],
        rejected_rewards: &[f64],
    ) -> Self {
        let n = chosen_rewards.len().max(1) as f64;
        let chosen_reward   = chosen_rewards.iter().sum::<f64>() / n;
        let rejected_reward = rejected_rewards.iter().sum::<f64>() / n;

        let correct = chosen_rewards
            .iter()
            .zip(rejected_rewards)
            .filter(|(c, r)| c > r)
            .count();

        Self {
            step,
            loss,
            chosen_reward,
            rejected_reward,
            reward_margin:      chosen_reward - rejected_reward,
            accuracy:           correct as f64 / n,
            chosen_log_ratio:   chosen_reward / beta,
            rejected_log_ratio: rejected_reward / beta,
        }
    }
}

/// Appends step metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the directory and write the CSV header if the file is new.
    /// Existing files are appended to across runs.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{CSV_HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one row.
    pub fn log(&self, epoch: usize, m: &StepMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.step,
            epoch,
            m.loss,
            m.chosen_reward,
            m.rejected_reward,
            m.reward_margin,
            m.accuracy,
            m.chosen_log_ratio,
            m.rejected_log_ratio,
        )?;

        tracing::debug!("Logged step {} metrics: loss={:.4}", m.step, m.loss);
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_metrics() {
        let chosen   = [1.0, 2.0, 1.5, 0.5];
        let rejected = [0.5, 1.0, 2.0, 0.0];

        let m = StepMetrics::compute(3, 0.1, 0.5, &chosen, &rejected);

        assert_eq!(m.step, 3);
        assert_eq!(m.loss, 0.1);
        assert!((m.chosen_reward   - 1.25 ).abs() < 1e-9);
        assert!((m.rejected_reward - 0.875).abs() < 1e-9);
        assert!((m.reward_margin   - 0.375).abs() < 1e-9);
        // 3 out of 4 chosen rewards are higher
        assert!((m.accuracy - 0.75).abs() < 1e-9);
        // log-ratios undo the beta = 0.5 scaling
        assert!((m.chosen_log_ratio   - 2.5 ).abs() < 1e-9);
        assert!((m.rejected_log_ratio - 1.75).abs() < 1e-9);
    }

    #[test]
    fn test_ties_do_not_count_as_correct() {
        let m = StepMetrics::compute(1, 0.69, 0.1, &[0.0, 0.0], &[0.0, 0.0]);
        assert_eq!(m.accuracy, 0.0);
        assert_eq!(m.reward_margin, 0.0);
    }

    #[test]
    fn test_logger_appends_rows_after_header() {
        let dir = std::env::temp_dir().join(format!("dpo-train-metrics-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let logger = MetricsLogger::new(dir.to_string_lossy().to_string()).unwrap();
        logger.log(1, &StepMetrics::compute(1, 0.5, 0.5, &[1.0], &[0.0])).unwrap();
        logger.log(1, &StepMetrics::compute(2, 0.4, 0.5, &[2.0], &[0.0])).unwrap();

        let contents = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("2,1,0.400000,2.000000"));
        assert!(lines[2].ends_with(",4.000000,0.000000"));

        fs::remove_dir_all(&dir).ok();
    }
}
