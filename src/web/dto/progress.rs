use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct UserProgressResponse {
    pub total_lessons: i64,
    pub completed_lessons: i64,
    pub display_name: String,
}

impl UserProgressResponse {
    pub fn new(total_lessons: i64, completed_lessons: i64, display_name: String) -> Self {
        Self {
            total_lessons,
            completed_lessons,
            display_name,
        }
    }
}
