use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

/// Final settlement of a consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    DeadLetter,
    Requeue,
}

/// What a worker does with its in-flight message on forced shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    #[default]
    Requeue,
    DeadLetter,
}

impl ShutdownPolicy {
    pub fn disposition(&self) -> Disposition {
        match self {
            ShutdownPolicy::Requeue => Disposition::Requeue,
            ShutdownPolicy::DeadLetter => Disposition::DeadLetter,
        }
    }
}

impl Display for Disposition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Disposition::Ack => write!(f, "ack"),
            Disposition::DeadLetter => write!(f, "dead_letter"),
            Disposition::Requeue => write!(f, "requeue"),
        }
    }
}
