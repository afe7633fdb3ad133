use std::path::PathBuf;

use serde_json::{json, Value};

use crate::read_phase::ReadOutcome;
use crate::stats::PhaseScore;
use crate::write_phase::WriteOutcome;

/// What one invocation did, for the operator and for `--json`.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub root: PathBuf,
    pub block_mb: f64,
    pub write: Option<WriteOutcome>,
    pub read: Option<ReadOutcome>,
    pub bad_dir_removed: bool,
}

impl RunSummary {
    /// Ids of blocks that failed verification.
    pub fn bad_blocks(&self) -> &[String] {
        self.read
            .as_ref()
            .map(|r| r.bad_blocks.as_slice())
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "root": self.root.display().to_string(),
            "block_mb": self.block_mb,
            "write": self.write.as_ref().map(|w| json!({
                "capacity_bytes": w.capacity_bytes,
                "blocks_written": w.blocks_written,
                "marker_written": w.marker_written,
                "filler": w.filler,
                "score": score_json(&w.score),
            })),
            "read": self.read.as_ref().map(|r| json!({
                "files": r.files,
                "verified": r.verified,
                "bad_blocks": r.bad_blocks,
                "marker_found": r.marker_found,
                "score": score_json(&r.score),
            })),
            "bad_dir_removed": self.bad_dir_removed,
        })
    }
}

fn score_json(score: &PhaseScore) -> Value {
    json!({
        "last": score.last_line,
        "checkpoints": score.checkpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape() {
        let summary = RunSummary {
            root: PathBuf::from("/media/stick"),
            block_mb: 10.0,
            write: None,
            read: Some(ReadOutcome {
                files: 3,
                score: PhaseScore {
                    last_line: Some("Min: 1.000M/s".into()),
                    checkpoints: vec!["10% a".into()],
                },
                write_score: String::new(),
                marker_found: true,
                verified: 2,
                bad_blocks: vec!["0badc0de".into()],
            }),
            bad_dir_removed: false,
        };
        let v = summary.to_json();
        assert!(v["write"].is_null());
        assert_eq!(v["read"]["verified"], 2);
        assert_eq!(v["read"]["bad_blocks"][0], "0badc0de");
        assert_eq!(v["read"]["score"]["checkpoints"][0], "10% a");
        assert_eq!(summary.bad_blocks(), ["0badc0de".to_string()]);
        assert!(RunSummary::default().bad_blocks().is_empty());
    }
}
