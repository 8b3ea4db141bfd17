use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = table_auto(TrainingCourse::Table)
            .col(pk_auto(TrainingCourse::Id))
            .col(string(TrainingCourse::Name))
            .col(text_null(TrainingCourse::Description))
            .col(boolean(TrainingCourse::IsActive).default(true))
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(Lesson::Table)
            .col(pk_auto(Lesson::Id))
            .col(integer(Lesson::CourseId))
            .col(string(Lesson::Title))
            .col(integer(Lesson::Position))
            .col(integer(Lesson::DurationMinutes).default(60))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_lesson_course")
                    .from(Lesson::Table, Lesson::CourseId)
                    .to(TrainingCourse::Table, TrainingCourse::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(ScheduledLesson::Table)
            .col(pk_auto(ScheduledLesson::Id))
            .col(integer(ScheduledLesson::MemberId))
            .col(integer(ScheduledLesson::LessonId))
            .col(timestamp(ScheduledLesson::ScheduledAt))
            .col(string(ScheduledLesson::Status).default("scheduled"))
            .col(boolean(ScheduledLesson::ReminderSent).default(false))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_scheduled_lesson_member")
                    .from(ScheduledLesson::Table, ScheduledLesson::MemberId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_scheduled_lesson_lesson")
                    .from(ScheduledLesson::Table, ScheduledLesson::LessonId)
                    .to(Lesson::Table, Lesson::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(Interview::Table)
            .col(pk_auto(Interview::Id))
            .col(integer(Interview::MemberId))
            .col(integer_null(Interview::InterviewerId))
            .col(timestamp(Interview::ScheduledAt))
            .col(string(Interview::Status).default("scheduled"))
            .col(text_null(Interview::Notes))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_interview_member")
                    .from(Interview::Table, Interview::MemberId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_interview_interviewer")
                    .from(Interview::Table, Interview::InterviewerId)
                    .to(User::Table, User::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_lesson_course_position")
                    .table(Lesson::Table)
                    .col(Lesson::CourseId)
                    .col(Lesson::Position)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_scheduled_lesson_member_lesson")
                    .table(ScheduledLesson::Table)
                    .col(ScheduledLesson::MemberId)
                    .col(ScheduledLesson::LessonId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Interview::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ScheduledLesson::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Lesson::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(TrainingCourse::Table).to_owned())
            .await?;

        Ok(())
    }
}
