//! Loss and accuracy for classification batches, plus the running
//! accumulator reported during a pass.

use burn::tensor::{activation::log_softmax, backend::Backend, ElementConversion, Int, Tensor};

/// Cross-entropy between raw scores and one-hot targets, averaged over the batch.
///
/// # Shapes
/// - scores: `[batch, classes]`
/// - one_hot: `[batch, classes]`
/// - output: `[1]`
pub fn cross_entropy_one_hot<B: Backend>(scores: Tensor<B, 2>, one_hot: Tensor<B, 2>) -> Tensor<B, 1> {
    let log_probs = log_softmax(scores, 1);
    (log_probs * one_hot).sum_dim(1).mean().neg()
}

/// Fraction of rows whose arg-max score equals the integer label
pub fn batch_accuracy<B: Backend>(scores: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let [batch_size, _] = scores.dims();
    if batch_size == 0 {
        return 0.0;
    }

    let predictions = scores.argmax(1).reshape([batch_size]);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();

    correct as f64 / batch_size as f64
}

/// Per-pass accumulator of loss and accuracy.
///
/// Means are taken over batches, not samples, so a short final batch
/// weighs as much as a full one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMetrics {
    loss_sum: f64,
    accuracy_sum: f64,
    batches: usize,
}

impl RunningMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one batch
    pub fn update(&mut self, loss: f64, accuracy: f64) {
        self.loss_sum += loss;
        self.accuracy_sum += accuracy;
        self.batches += 1;
    }

    pub fn mean_loss(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.loss_sum / self.batches as f64
        }
    }

    pub fn mean_accuracy(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.accuracy_sum / self.batches as f64
        }
    }

    pub fn batches(&self) -> usize {
        self.batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn scores(values: Vec<f32>, rows: usize) -> Tensor<TestBackend, 2> {
        let cols = values.len() / rows;
        Tensor::from_floats(TensorData::new(values, [rows, cols]), &Default::default())
    }

    fn labels(values: Vec<i64>) -> Tensor<TestBackend, 1, Int> {
        let len = values.len();
        Tensor::from_data(TensorData::new(values, [len]), &Default::default())
    }

    #[test]
    fn test_accuracy_all_correct() {
        let s = scores(vec![5.0, 0.0, 0.0, 0.0, 3.0, 1.0, 0.0, 0.0, 9.0], 3);
        assert_eq!(batch_accuracy(s, labels(vec![0, 1, 2])), 1.0);
    }

    #[test]
    fn test_accuracy_none_correct() {
        let s = scores(vec![5.0, 0.0, 0.0, 0.0, 3.0, 1.0, 0.0, 0.0, 9.0], 3);
        assert_eq!(batch_accuracy(s, labels(vec![1, 2, 0])), 0.0);
    }

    #[test]
    fn test_accuracy_partial() {
        let s = scores(vec![1.0, 0.0, 0.0, 1.0], 2);
        assert_eq!(batch_accuracy(s, labels(vec![0, 0])), 0.5);
    }

    #[test]
    fn test_cross_entropy_uniform_scores() {
        // Equal scores over 4 classes give ln(4) regardless of the target.
        let s = scores(vec![0.0; 8], 2);
        let one_hot = scores(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0], 2);
        let loss: f32 = cross_entropy_one_hot(s, one_hot).into_scalar().elem();
        assert!((loss - 4.0f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_cross_entropy_confident_prediction() {
        let s = scores(vec![20.0, 0.0, 0.0], 1);
        let one_hot = scores(vec![1.0, 0.0, 0.0], 1);
        let loss: f32 = cross_entropy_one_hot(s, one_hot).into_scalar().elem();
        assert!(loss < 1e-6);
    }

    #[test]
    fn test_running_mean_over_batches() {
        let mut metrics = RunningMetrics::new();
        metrics.update(2.0, 0.5);
        metrics.update(4.0, 1.0);
        assert_eq!(metrics.mean_loss(), 3.0);
        assert_eq!(metrics.mean_accuracy(), 0.75);
        assert_eq!(metrics.batches(), 2);
    }

    #[test]
    fn test_running_metrics_empty() {
        let metrics = RunningMetrics::new();
        assert_eq!(metrics.mean_loss(), 0.0);
        assert_eq!(metrics.mean_accuracy(), 0.0);
    }
}
