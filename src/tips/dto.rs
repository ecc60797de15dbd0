use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tip {
    pub title: String,
    #[serde(default)]
    pub body: String,
}
