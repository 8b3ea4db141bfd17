use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};

use crate::auth::Viewer;
use crate::core::now;
use crate::entities::{lesson, sea_orm_active_enums::Role, training_course};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{checkbox, trimmed};
use crate::util::validation::{check_length, require_text};

#[derive(Debug, Clone, Deserialize)]
pub struct CourseInput {
    pub name: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub description: Option<String>,
    #[serde(default = "default_true", deserialize_with = "checkbox")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct LessonInput {
    pub title: String,
    pub position: i32,
    pub duration_minutes: i32,
}

impl LessonInput {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "title", &self.title);
        check_length(&mut errors, "title", &self.title, 200);
        if self.position < 1 {
            errors.add("position", "must be at least 1");
        }
        if !(1..=480).contains(&self.duration_minutes) {
            errors.add("duration_minutes", "must be between 1 and 480");
        }
        errors.into_result()
    }
}

#[derive(Debug, Serialize)]
pub struct Course {
    #[serde(flatten)]
    pub course: training_course::Model,
    pub lessons: Vec<lesson::Model>,
}

pub async fn list(db: &DatabaseConnection) -> AppResult<Vec<training_course::Model>> {
    Ok(training_course::Entity::find()
        .order_by_asc(training_course::Column::Name)
        .all(db)
        .await?)
}

pub(crate) async fn find(db: &DatabaseConnection, id: i32) -> AppResult<training_course::Model> {
    training_course::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("course"))
}

/// Lessons in teaching order.
pub(crate) async fn lessons(db: &DatabaseConnection, course_id: i32) -> AppResult<Vec<lesson::Model>> {
    Ok(lesson::Entity::find()
        .filter(lesson::Column::CourseId.eq(course_id))
        .order_by_asc(lesson::Column::Position)
        .all(db)
        .await?)
}

pub async fn get(db: &DatabaseConnection, id: i32) -> AppResult<Course> {
    let course = find(db, id).await?;
    let lessons = lessons(db, id).await?;
    Ok(Course { course, lessons })
}

fn validate(input: &CourseInput) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "name", &input.name);
    check_length(&mut errors, "name", &input.name, 120);
    errors.into_result()
}

pub async fn create(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: CourseInput,
) -> AppResult<training_course::Model> {
    viewer.require(Role::can_manage_onboarding, "manage courses")?;
    validate(&input)?;
    let stamp = now();
    Ok(training_course::ActiveModel {
        name: Set(input.name.trim().to_string()),
        description: Set(input.description),
        is_active: Set(input.is_active),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

pub async fn update(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: CourseInput,
) -> AppResult<training_course::Model> {
    viewer.require(Role::can_manage_onboarding, "manage courses")?;
    validate(&input)?;
    let mut active: training_course::ActiveModel = find(db, id).await?.into();
    active.name = Set(input.name.trim().to_string());
    active.description = Set(input.description);
    active.is_active = Set(input.is_active);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn add_lesson(
    db: &DatabaseConnection,
    viewer: &Viewer,
    course_id: i32,
    input: LessonInput,
) -> AppResult<lesson::Model> {
    viewer.require(Role::can_manage_onboarding, "manage courses")?;
    input.validate()?;
    find(db, course_id).await?;
    let stamp = now();
    Ok(lesson::ActiveModel {
        course_id: Set(course_id),
        title: Set(input.title.trim().to_string()),
        position: Set(input.position),
        duration_minutes: Set(input.duration_minutes),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

async fn find_lesson(db: &DatabaseConnection, id: i32) -> AppResult<lesson::Model> {
    lesson::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("lesson"))
}

pub async fn update_lesson(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: LessonInput,
) -> AppResult<lesson::Model> {
    viewer.require(Role::can_manage_onboarding, "manage courses")?;
    input.validate()?;
    let mut active: lesson::ActiveModel = find_lesson(db, id).await?.into();
    active.title = Set(input.title.trim().to_string());
    active.position = Set(input.position);
    active.duration_minutes = Set(input.duration_minutes);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn remove_lesson(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<()> {
    viewer.require(Role::can_manage_onboarding, "manage courses")?;
    find_lesson(db, id).await?.delete(db).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::{member_viewer, test_db};

    /// A course with `n` hour-long lessons.
    pub(crate) async fn course_with_lessons(
        db: &DatabaseConnection,
        staff: &Viewer,
        n: i32,
    ) -> training_course::Model {
        let course = create(
            db,
            staff,
            CourseInput {
                name: "Foundations".into(),
                description: None,
                is_active: true,
            },
        )
        .await
        .unwrap();
        for position in 1..=n {
            add_lesson(
                db,
                staff,
                course.id,
                LessonInput {
                    title: format!("Lesson {position}"),
                    position,
                    duration_minutes: 60,
                },
            )
            .await
            .unwrap();
        }
        course
    }

    #[tokio::test]
    async fn lessons_come_back_in_order_and_positions_are_unique() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Priscilla", Role::Pastor).await;
        let course = create(
            &db,
            &pastor,
            CourseInput {
                name: "Foundations".into(),
                description: Some("Newcomers".into()),
                is_active: true,
            },
        )
        .await
        .unwrap();
        for (title, position) in [("Prayer", 2), ("Scripture", 1)] {
            add_lesson(
                &db,
                &pastor,
                course.id,
                LessonInput { title: title.into(), position, duration_minutes: 45 },
            )
            .await
            .unwrap();
        }
        let detail = get(&db, course.id).await.unwrap();
        let titles: Vec<_> = detail.lessons.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, ["Scripture", "Prayer"]);

        assert!(matches!(
            add_lesson(
                &db,
                &pastor,
                course.id,
                LessonInput { title: "Again".into(), position: 1, duration_minutes: 45 },
            )
            .await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn members_cannot_edit_courses() {
        let db = test_db().await;
        let member = member_viewer(&db, "Aquila", Role::Member).await;
        let result = create(
            &db,
            &member,
            CourseInput { name: "Mine".into(), description: None, is_active: true },
        )
        .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
