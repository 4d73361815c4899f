use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Immutable once any submission has been judged against it, so results
/// stay reproducible.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "test_case")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub input: String,
    /// Hidden from any UI unless `is_sample`.
    #[sea_orm(column_type = "Text")]
    pub expected_output: String,
    pub is_sample: bool,
    /// Judging order within the problem.
    pub position: i32,

    pub problem_id: i64,
    #[sea_orm(belongs_to, from = "problem_id", to = "id")]
    pub problem: HasOne<super::problem::Entity>,

    #[sea_orm(has_many)]
    pub results: HasMany<super::test_case_result::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
