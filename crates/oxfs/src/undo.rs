//! In-memory record of the committed steps of a multi-step operation.
//!
//! Operations that touch several inodes push one [`Step`] per committed
//! write. On failure the steps are handed back newest first so the caller
//! can reverse them; on success the log is simply dropped.

use alloc::string::String;
use alloc::vec::Vec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A new inode was written.
    Created(u64),
    /// An entry `name` was appended to directory inode `dir`.
    Linked { dir: u64, name: String },
    /// Directory `dir` had its `..` moved from `from` to `to`.
    Reparented { dir: u64, from: u64, to: u64 },
}

#[derive(Debug, Default)]
pub struct UndoLog {
    steps: Vec<Step>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in the order they must be reversed.
    pub fn unwind(self) -> impl Iterator<Item = Step> {
        self.steps.into_iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn unwinds_newest_first() {
        let mut log = UndoLog::new();
        assert!(log.is_empty());
        log.record(Step::Created(120));
        log.record(Step::Linked {
            dir: 2,
            name: "etc".to_string(),
        });
        let steps: Vec<Step> = log.unwind().collect();
        assert_eq!(
            steps,
            [
                Step::Linked {
                    dir: 2,
                    name: "etc".to_string()
                },
                Step::Created(120)
            ]
        );
    }
}
