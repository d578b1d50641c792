use serde::{Deserialize, Serialize};

use crate::model::{StudentId, TopicId};

/// The parts of a student account the tutor needs to address and pitch questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: StudentId,
    pub first_name: String,
    pub grade_level: u8,
    pub curriculum_level: u8,
}

/// A curriculum topic a session practises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub code: String,
    pub title: String,
    pub description: String,
    pub strand: String,
    pub sub_strand: Option<String>,
    pub level: u8,
    #[serde(default)]
    pub elaborations: Vec<String>,
}
