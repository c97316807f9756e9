use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub file_path: String,
    pub file_name: String,
    pub dir_path: String,
    pub file_size: i64,
    pub created_at: Option<String>,
    pub last_viewed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAsset {
    pub file_path: String,
    pub file_name: String,
    pub dir_path: String,
    pub file_size: i64,
}

/// Conjunctive filters for paginated asset queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetFilter {
    /// The asset must carry every one of these labels.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Substring of the file name or full path.
    #[serde(default)]
    pub path_keyword: Option<String>,
    #[serde(default)]
    pub exact_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPage {
    pub assets: Vec<Asset>,
    pub total: i64,
}

/// What a tagging strategy gets to look at for one asset.
#[derive(Debug, Clone)]
pub struct AssetTarget {
    pub id: i64,
    pub file_path: String,
    pub file_name: String,
}

impl From<&Asset> for AssetTarget {
    fn from(asset: &Asset) -> Self {
        Self {
            id: asset.id,
            file_path: asset.file_path.clone(),
            file_name: asset.file_name.clone(),
        }
    }
}
