use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    model::{DatabaseResult, entity::CourseWithLessonsRow},
    web::UserRole,
};

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct LessonShort {
    pub id: Uuid,
    pub title: String,
    pub completed: bool,
    pub order_index: i32,
}

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct CourseWithLessons {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub required_role: UserRole,
    pub published: bool,
    pub order_index: i32,
    pub lessons: Vec<LessonShort>,
}

impl TryFrom<CourseWithLessonsRow> for CourseWithLessons {
    type Error = serde_json::Error;

    fn try_from(value: CourseWithLessonsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            title: value.title,
            description: value.description,
            required_role: UserRole::from(value.required_role.as_str()),
            published: value.published,
            order_index: value.order_index,
            lessons: serde_json::from_value(value.lessons)?,
        })
    }
}

impl CourseWithLessons {
    pub fn from_rows(rows: Vec<CourseWithLessonsRow>) -> DatabaseResult<Vec<Self>> {
        Ok(rows
            .into_iter()
            .map(CourseWithLessons::try_from)
            .collect::<Result<_, _>>()?)
    }

    pub fn is_visible_to(&self, role: UserRole) -> bool {
        role == UserRole::Admin || (self.published && role.at_least(self.required_role))
    }
}
