//! Trial record for HPO

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::parameter::ParameterValue;

/// Values drawn by one tuning trial
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trial {
    /// Trial ID
    pub id: usize,
    /// Parameter configuration
    pub config: HashMap<String, ParameterValue>,
}

impl Trial {
    /// Create an empty trial
    pub fn new(id: usize) -> Self {
        Self {
            id,
            config: HashMap::new(),
        }
    }
}
