use anyhow::Result;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::validation::slugify;

pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Home Services", "Repairs, cleaning and maintenance around the house"),
    ("Design & Creative", "Graphic design, illustration, photography and video"),
    ("Software & IT", "Web, mobile and infrastructure work"),
    ("Writing & Translation", "Copywriting, editing and translation"),
    ("Tutoring & Lessons", "Academic tutoring, music and language lessons"),
    ("Events", "Catering, entertainment and event staffing"),
];

pub const DEFAULT_SKILLS: &[&str] = &[
    "Plumbing",
    "Electrical",
    "Carpentry",
    "Cleaning",
    "Graphic Design",
    "Photography",
    "Web Development",
    "Copywriting",
    "Translation",
    "Tutoring",
];

pub struct SeedSummary {
    pub categories: Vec<String>,
    pub skills: Vec<String>,
}

/// Inserts the default categories and skills; existing slugs are left untouched.
pub async fn seed_catalog(pool: &Pool<Postgres>) -> Result<SeedSummary> {
    let mut categories = Vec::new();
    for (position, (name, description)) in DEFAULT_CATEGORIES.iter().enumerate() {
        let slug = slugify(name);
        let result = sqlx::query(
            "INSERT INTO mp.categories (category_id, slug, name, description, position) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (slug) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&slug)
        .bind(name)
        .bind(description)
        .bind(position as i32)
        .execute(pool)
        .await?;
        if result.rows_affected() > 0 {
            categories.push(slug);
        }
    }

    let mut skills = Vec::new();
    for name in DEFAULT_SKILLS {
        let slug = slugify(name);
        let result = sqlx::query(
            "INSERT INTO mp.skills (skill_id, slug, name) VALUES ($1, $2, $3) \
             ON CONFLICT (slug) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&slug)
        .bind(name)
        .execute(pool)
        .await?;
        if result.rows_affected() > 0 {
            skills.push(slug);
        }
    }

    tracing::info!(
        categories = categories.len(),
        skills = skills.len(),
        "catalog seeded"
    );
    Ok(SeedSummary { categories, skills })
}
