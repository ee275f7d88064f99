//! The `courses` and `lessons` collections, and the joined course outline
//! the course player and editor both consume.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::{
    collections, decode, encode, new_doc_id, note_missing_index, server_timestamp, Direction,
    Document, DocumentStore, Query, StoreError, WriteBatch,
};
use crate::types::{CourseId, LessonId};

/// Course record. `module_order` fixes the display order of the course's
/// module titles; lessons reference a module by title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(skip)]
    pub id: CourseId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub module_order: Vec<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Lesson record, owned by a course and grouped under a module title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[serde(skip)]
    pub id: LessonId,
    pub course_id: CourseId,
    pub module_id: String,
    pub title: String,
    #[serde(default)]
    pub order: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Lessons grouped under one module title, in lesson order.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseModule {
    pub title: String,
    pub lessons: Vec<Lesson>,
}

/// A course joined with all of its lessons, grouped into modules.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseOutline {
    pub course: Course,
    pub modules: Vec<CourseModule>,
}

/// The course catalog over any document store.
pub struct Catalog<D> {
    store: Arc<D>,
}

// Manual Clone: avoid derive adding a `D: Clone` bound.
impl<D> Clone for Catalog<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<D> Catalog<D> {
    #[must_use]
    pub fn new(store: Arc<D>) -> Self {
        Self { store }
    }
}

pub(crate) fn decode_course(doc: Document) -> Result<Course, StoreError> {
    let (id, mut course) = decode::<Course>(doc)?;
    course.id = CourseId::from(id);
    Ok(course)
}

fn decode_lesson(doc: Document) -> Result<Lesson, StoreError> {
    let (id, mut lesson) = decode::<Lesson>(doc)?;
    lesson.id = LessonId::from(id);
    Ok(lesson)
}

impl<D: DocumentStore> Catalog<D> {
    /// Every course, ordered by title.
    ///
    /// # Errors
    ///
    /// Propagates store failures, including a missing title index as
    /// [`StoreError::FailedPrecondition`].
    pub async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        let docs = self
            .store
            .query(
                collections::COURSES,
                Query::new().order_by("title", Direction::Ascending),
            )
            .await
            .inspect_err(|e| note_missing_index(collections::COURSES, e))?;
        docs.into_iter().map(decode_course).collect()
    }

    /// Courses flagged for the home page.
    ///
    /// # Errors
    ///
    /// Propagates store failures, including a missing `isFeatured` index
    /// as [`StoreError::FailedPrecondition`].
    pub async fn featured_courses(&self) -> Result<Vec<Course>, StoreError> {
        let docs = self
            .store
            .query(
                collections::COURSES,
                Query::new().where_eq("isFeatured", true),
            )
            .await
            .inspect_err(|e| note_missing_index(collections::COURSES, e))?;
        docs.into_iter().map(decode_course).collect()
    }

    /// One course by id. `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn course(&self, id: &CourseId) -> Result<Option<Course>, StoreError> {
        match self.store.get(collections::COURSES, id.as_str()).await? {
            Some(doc) => Ok(Some(decode_course(doc)?)),
            None => Ok(None),
        }
    }

    /// All lessons of one course, in lesson order.
    ///
    /// # Errors
    ///
    /// Propagates store failures, including the missing composite index as
    /// [`StoreError::FailedPrecondition`].
    pub async fn course_lessons(&self, id: &CourseId) -> Result<Vec<Lesson>, StoreError> {
        let docs = self
            .store
            .query(
                collections::LESSONS,
                Query::new()
                    .where_eq("courseId", id.as_str())
                    .order_by("order", Direction::Ascending),
            )
            .await
            .inspect_err(|e| note_missing_index(collections::LESSONS, e))?;
        docs.into_iter().map(decode_lesson).collect()
    }

    /// A course and all of its lessons in one joined read, lessons grouped
    /// into modules.
    ///
    /// Modules appear in the course's `module_order`; lessons referencing
    /// a module the course does not list get their module appended at the
    /// end, in lesson order.
    ///
    /// # Errors
    ///
    /// Propagates store failures from either read.
    pub async fn course_outline(&self, id: &CourseId) -> Result<Option<CourseOutline>, StoreError> {
        let (course, lessons) = tokio::try_join!(self.course(id), self.course_lessons(id))?;
        let Some(course) = course else {
            tracing::debug!(course = %id, "Course outline requested for a missing course");
            return Ok(None);
        };

        let mut modules: Vec<CourseModule> = course
            .module_order
            .iter()
            .map(|title| CourseModule {
                title: title.clone(),
                lessons: Vec::new(),
            })
            .collect();

        for lesson in lessons {
            match modules.iter_mut().find(|m| m.title == lesson.module_id) {
                Some(module) => module.lessons.push(lesson),
                None => modules.push(CourseModule {
                    title: lesson.module_id.clone(),
                    lessons: vec![lesson],
                }),
            }
        }

        Ok(Some(CourseOutline { course, modules }))
    }

    /// Create or update a course and its lessons in one atomic batch.
    ///
    /// With `id` absent a new course id is minted; lessons with an empty
    /// id get fresh ids. Every lesson is (re)pointed at the final course
    /// id, and the course's `updatedAt` is server-stamped.
    ///
    /// # Errors
    ///
    /// Propagates store failures; nothing is written on error.
    pub async fn save_course(
        &self,
        id: Option<&CourseId>,
        course: &Course,
        lessons: &[Lesson],
    ) -> Result<CourseId, StoreError> {
        let course_id = id.cloned().unwrap_or_else(|| CourseId::from(new_doc_id()));

        let mut batch = WriteBatch::new();
        let mut fields = encode(course_id.as_str(), course)?;
        fields.insert("updatedAt".into(), server_timestamp());
        batch.set(collections::COURSES, course_id.as_str(), fields, true);

        for lesson in lessons {
            let lesson_id = if lesson.id.as_str().is_empty() {
                LessonId::from(new_doc_id())
            } else {
                lesson.id.clone()
            };
            let mut fields = encode(lesson_id.as_str(), lesson)?;
            fields.insert("courseId".into(), Value::String(course_id.to_string()));
            batch.set(collections::LESSONS, lesson_id.as_str(), fields, true);
        }

        self.store.commit(batch).await?;
        Ok(course_id)
    }

    /// Delete a course and every one of its lessons in one atomic batch.
    ///
    /// # Errors
    ///
    /// Propagates store failures; nothing is deleted on error.
    pub async fn delete_course(&self, id: &CourseId) -> Result<(), StoreError> {
        let lessons = self.course_lessons(id).await?;
        let mut batch = WriteBatch::new();
        for lesson in &lessons {
            batch.delete(collections::LESSONS, lesson.id.as_str());
        }
        batch.delete(collections::COURSES, id.as_str());
        self.store.commit(batch).await?;
        tracing::info!(course = %id, lessons = lessons.len(), "Course deleted");
        Ok(())
    }
}
