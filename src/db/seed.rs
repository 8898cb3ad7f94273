/**
 * Database Seeding
 * Idempotent provisioning of roles, permissions, the admin account and
 * sample content. Safe to run repeatedly.
 */
use bcrypt::{hash, DEFAULT_COST};
use sqlx::PgPool;
use uuid::Uuid;

use crate::content;
use crate::db::models::PostStatus;
use crate::identity::ADMIN_ROLE;

const ROLES: [(&str, &str); 4] = [
    ("admin", "Full administrative access"),
    ("user", "Registered site user"),
    ("subscriber", "Newsletter subscriber"),
    ("client", "Client with project access"),
];

/// (name, resource, action, description)
const PERMISSIONS: [(&str, &str, &str, &str); 8] = [
    ("read_posts", "posts", "read", "Read published blog posts"),
    ("write_posts", "posts", "write", "Author blog posts"),
    (
        "manage_posts",
        "posts",
        "manage",
        "Full blog post and comment management",
    ),
    ("read_users", "users", "read", "View user accounts"),
    (
        "manage_users",
        "users",
        "manage",
        "Manage user accounts and roles",
    ),
    ("access_admin", "admin", "access", "Access the admin dashboard"),
    (
        "read_resources",
        "resources",
        "read",
        "Read case studies and resources",
    ),
    (
        "manage_resources",
        "resources",
        "manage",
        "Manage case studies and resources",
    ),
];

/// Permissions granted to the default `user` role.
const USER_GRANTS: [&str; 2] = ["read_posts", "read_resources"];

const ADMIN_EMAIL: &str = "admin@rippleworks.com";
const ADMIN_PASSWORD: &str = "admin123!";

/// Run the full seed. Every statement upserts, so re-running converges on
/// the same state without clobbering later edits to seeded rows.
pub async fn run(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
    seed_roles_and_permissions(pool).await?;
    let admin_id = seed_admin_user(pool).await?;
    seed_sample_content(pool, admin_id).await?;
    tracing::info!("Database seed complete");
    Ok(())
}

async fn upsert_role(pool: &PgPool, name: &str, description: &str) -> Result<Uuid, sqlx::Error> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO roles (name, description)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn upsert_permission(
    pool: &PgPool,
    name: &str,
    resource: &str,
    action: &str,
    description: &str,
) -> Result<Uuid, sqlx::Error> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO permissions (name, resource, action, description)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name) DO UPDATE
            SET resource = EXCLUDED.resource,
                action = EXCLUDED.action,
                description = EXCLUDED.description
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(resource)
    .bind(action)
    .bind(description)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn grant(pool: &PgPool, role_id: Uuid, permission_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO role_permissions (role_id, permission_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(role_id)
    .bind(permission_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn seed_roles_and_permissions(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let mut admin_role_id = None;
    let mut user_role_id = None;
    for (name, description) in ROLES {
        let id = upsert_role(pool, name, description).await?;
        if name == ADMIN_ROLE {
            admin_role_id = Some(id);
        } else if name == "user" {
            user_role_id = Some(id);
        }
    }
    let admin_role_id = admin_role_id.ok_or("admin role missing after seed")?;
    let user_role_id = user_role_id.ok_or("user role missing after seed")?;

    for (name, resource, action, description) in PERMISSIONS {
        let permission_id = upsert_permission(pool, name, resource, action, description).await?;
        // Admin holds every permission.
        grant(pool, admin_role_id, permission_id).await?;
        if USER_GRANTS.contains(&name) {
            grant(pool, user_role_id, permission_id).await?;
        }
    }

    tracing::info!(
        roles = ROLES.len(),
        permissions = PERMISSIONS.len(),
        "roles and permissions seeded"
    );
    Ok(())
}

async fn seed_admin_user(pool: &PgPool) -> Result<Uuid, Box<dyn std::error::Error>> {
    let password_hash = hash(ADMIN_PASSWORD, DEFAULT_COST)?;

    // Only the fresh insert gets the seed password; an existing admin keeps
    // whatever password it has.
    let (admin_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, is_verified)
        VALUES ($1, $2, 'Admin', 'User', true)
        ON CONFLICT (email) DO UPDATE SET updated_at = now()
        RETURNING id
        "#,
    )
    .bind(ADMIN_EMAIL)
    .bind(&password_hash)
    .fetch_one(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO user_roles (user_id, role_id)
        SELECT $1, id FROM roles WHERE name = $2
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(admin_id)
    .bind(ADMIN_ROLE)
    .execute(pool)
    .await?;

    tracing::info!(email = ADMIN_EMAIL, "admin account seeded");
    Ok(admin_id)
}

async fn seed_sample_content(
    pool: &PgPool,
    admin_id: Uuid,
) -> Result<(), Box<dyn std::error::Error>> {
    let post_title = "Welcome to RippleWorks!";
    sqlx::query(
        r#"
        INSERT INTO blog_posts
            (title, slug, content, excerpt, status, published_at, author_id)
        VALUES ($1, $2, $3, $4, $5, now(), $6)
        ON CONFLICT (slug) DO NOTHING
        "#,
    )
    .bind(post_title)
    .bind(content::slugify(post_title))
    .bind(
        "We're excited to launch the RippleWorks blog. Here you'll find \
         practical marketing advice for small businesses, case studies from \
         our client work, and updates from our team.",
    )
    .bind("Introducing the RippleWorks blog.")
    .bind(PostStatus::Published)
    .bind(admin_id)
    .execute(pool)
    .await?;

    let study_title = "Local Bakery Doubles Online Orders";
    sqlx::query(
        r#"
        INSERT INTO case_studies
            (title, slug, client, industry, challenge, solution, results,
             technologies, featured, meta_title)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, true, $1)
        ON CONFLICT (slug) DO NOTHING
        "#,
    )
    .bind(study_title)
    .bind(content::slugify(study_title))
    .bind("Sunrise Bakery")
    .bind("Food & Beverage")
    .bind("Online ordering was buried three clicks deep and mobile checkout failed for half of visitors.")
    .bind("We rebuilt the ordering flow around a single-page checkout and ran a local search campaign.")
    .bind("Online orders doubled within two months and cart abandonment dropped by a third.")
    .bind(vec![
        "Shopify".to_string(),
        "Google Ads".to_string(),
        "Mailchimp".to_string(),
    ])
    .execute(pool)
    .await?;

    tracing::info!("sample content seeded");
    Ok(())
}
