use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::entity::LessonWithStatusRow;

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LessonResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub content: String,
    pub video_url: Option<String>,
    pub has_material: bool,
    pub status: bool,
    pub next_lesson_id: Option<Uuid>,
}

impl LessonResponse {
    pub fn new(row: LessonWithStatusRow, next_lesson_id: Option<Uuid>) -> Self {
        Self {
            id: row.id,
            course_id: row.course_id,
            title: row.title,
            content: row.content,
            video_url: row.video_url,
            has_material: row.has_material,
            status: row.status,
            next_lesson_id,
        }
    }
}

/// Short-lived link to a lesson attachment.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MaterialLink {
    pub url: String,
    pub expires: i64,
}
