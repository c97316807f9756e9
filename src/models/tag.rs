use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagScore {
    pub name: String,
    pub confidence: f64,
}

impl TagScore {
    pub fn new(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

/// Conflict behavior of a single association write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreWrite {
    /// Insert, or update confidence and provenance of the existing row.
    Replace,
    /// Insert only when the (asset, tag) pair has no row yet.
    InsertIfAbsent,
}

/// How a tagging run treats labels an asset already carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    #[default]
    Append,
    Overwrite,
    Unique,
    Skip,
}

impl WritePolicy {
    pub fn store_write(self) -> StoreWrite {
        match self {
            Self::Unique => StoreWrite::InsertIfAbsent,
            Self::Append | Self::Overwrite | Self::Skip => StoreWrite::Replace,
        }
    }
}

impl std::fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::Overwrite => write!(f, "overwrite"),
            Self::Unique => write!(f, "unique"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

impl std::str::FromStr for WritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(Self::Append),
            "overwrite" => Ok(Self::Overwrite),
            "unique" => Ok(Self::Unique),
            "skip" => Ok(Self::Skip),
            _ => Err(format!("unknown write policy: {s}")),
        }
    }
}
