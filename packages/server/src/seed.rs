use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, PaginatorTrait, Set};
use tracing::info;
use uuid::Uuid;

use crate::entity::{problem, test_case, user};

/// Seed a demo user and an "A + B" problem so the pipeline can be
/// exercised on a fresh database. No-op when users already exist.
pub async fn seed_demo_data(db: &DatabaseConnection) -> Result<(), DbErr> {
    if user::Entity::find().count(db).await? > 0 {
        return Ok(());
    }

    let now = Utc::now();

    let demo_user = user::ActiveModel {
        id: NotSet,
        username: Set("demo".into()),
        created_at: Set(now),
    }
    .insert(db)
    .await?;

    let demo_problem = problem::ActiveModel {
        id: NotSet,
        title: Set("A + B".into()),
        time_limit: Set(1.0),
        memory_limit: Set(256),
        created_at: Set(now),
    }
    .insert(db)
    .await?;

    let cases = [("1 2", "3", true), ("10 20", "30", false)];
    for (position, (input, expected, is_sample)) in cases.into_iter().enumerate() {
        test_case::ActiveModel {
            id: Set(Uuid::new_v4()),
            input: Set(input.into()),
            expected_output: Set(expected.into()),
            is_sample: Set(is_sample),
            position: Set(position as i32 + 1),
            problem_id: Set(demo_problem.id),
            created_at: Set(now),
        }
        .insert(db)
        .await?;
    }

    info!(
        user_id = demo_user.id,
        problem_id = demo_problem.id,
        "Seeded demo data"
    );

    Ok(())
}
