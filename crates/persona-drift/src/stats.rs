use serde::{Deserialize, Serialize};

use persona_core::types::{ChannelMap, DriftDetectionResult};

use crate::suggestions::CHANNEL_SUB_THRESHOLD;

/// Aggregate over a batch of drift checks, for session-level monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftStats {
    pub total_outputs: usize,
    pub drift_count: usize,
    /// 0 for an empty batch.
    pub drift_rate: f32,
    /// 0 for an empty batch.
    pub avg_similarity: f32,
    /// Outputs scoring below the channel sub-threshold, per channel.
    pub channel_issues: ChannelMap<usize>,
}

impl DriftStats {
    pub fn from_results(results: &[DriftDetectionResult]) -> Self {
        let total_outputs = results.len();
        let drift_count = results.iter().filter(|r| r.has_drift).count();
        let mut channel_issues: ChannelMap<usize> = ChannelMap::default();
        for result in results {
            for (channel, similarity) in &result.channel_drift {
                if *similarity < CHANNEL_SUB_THRESHOLD {
                    *channel_issues.get_mut(*channel) += 1;
                }
            }
        }
        if total_outputs == 0 {
            return Self { total_outputs, drift_count, drift_rate: 0.0, avg_similarity: 0.0, channel_issues };
        }
        #[allow(clippy::cast_precision_loss)]
        let n = total_outputs as f32;
        #[allow(clippy::cast_precision_loss)]
        let drift_rate = drift_count as f32 / n;
        let avg_similarity = results.iter().map(|r| r.similarity).sum::<f32>() / n;
        Self { total_outputs, drift_count, drift_rate, avg_similarity, channel_issues }
    }
}
