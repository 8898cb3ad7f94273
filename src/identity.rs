//! Identity store: users, roles, permissions and the join relations between
//! them. All lookups take the pool explicitly; nothing here owns state.

use std::collections::BTreeSet;

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{Permission, Role, User};
use crate::error::{is_unique_violation, ApiError};

/// Canonical role name, e.g. `is_admin` checks against this.
pub const ADMIN_ROLE: &str = "admin";
/// Role granted to every self-registered account.
pub const DEFAULT_ROLE: &str = "user";

/// Canonical casing for role names. The provisioning paths of the original
/// system wrote both "admin" and "ADMIN"; here every write and every check
/// goes through this normalization instead.
pub fn normalize_role_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Emails are lowercased at the input boundary so the unique key behaves
/// case-insensitively while the stored comparison stays byte-wise.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn create_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Result<User, ApiError> {
    let result = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name)
        VALUES ($1, $2, $3, $4)
        RETURNING id, email, password_hash, first_name, last_name, is_verified,
                  created_at, updated_at
        "#,
    )
    .bind(email)
    .bind(password_hash)
    .bind(first_name)
    .bind(last_name)
    .fetch_one(pool)
    .await;

    result.map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Duplicate("Email already registered".to_string())
        } else {
            e.into()
        }
    })
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, first_name, last_name, is_verified,
               created_at, updated_at
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn find_user(pool: &PgPool, id: Uuid) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, first_name, last_name, is_verified,
               created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn find_role_by_name(pool: &PgPool, name: &str) -> Result<Option<Role>, ApiError> {
    let role = sqlx::query_as::<_, Role>(
        "SELECT id, name, description, created_at FROM roles WHERE name = $1",
    )
    .bind(normalize_role_name(name))
    .fetch_optional(pool)
    .await?;
    Ok(role)
}

/// Idempotent: re-assigning an already-held role is a no-op, not an error.
pub async fn assign_role(pool: &PgPool, user_id: Uuid, role_id: Uuid) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        INSERT INTO user_roles (user_id, role_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, role_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(role_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn assign_role_by_name(
    pool: &PgPool,
    user_id: Uuid,
    role_name: &str,
) -> Result<(), ApiError> {
    let role = find_role_by_name(pool, role_name)
        .await?
        .ok_or(ApiError::NotFound("Role"))?;
    assign_role(pool, user_id, role.id).await
}

/// Names of every role the user holds, canonical casing.
pub async fn user_role_names(pool: &PgPool, user_id: Uuid) -> Result<Vec<String>, ApiError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT r.name
        FROM roles r
        JOIN user_roles ur ON ur.role_id = r.id
        WHERE ur.user_id = $1
        ORDER BY r.name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Union of the permissions granted by every role the user holds,
/// deduplicated by permission name and sorted by name.
pub async fn effective_permissions(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<Permission>, ApiError> {
    let rows = sqlx::query_as::<_, Permission>(
        r#"
        SELECT p.id, p.name, p.resource, p.action, p.description
        FROM permissions p
        JOIN role_permissions rp ON rp.permission_id = p.id
        JOIN user_roles ur ON ur.role_id = rp.role_id
        WHERE ur.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(dedup_permissions(rows))
}

/// Two roles granting the same permission must yield one entry, keyed by name.
pub fn dedup_permissions(mut permissions: Vec<Permission>) -> Vec<Permission> {
    permissions.sort_by(|a, b| a.name.cmp(&b.name));
    permissions.dedup_by(|a, b| a.name == b.name);
    permissions
}

/// True iff `permission_name` is in the user's effective permission set.
pub async fn user_has_permission(
    pool: &PgPool,
    user_id: Uuid,
    permission_name: &str,
) -> Result<bool, ApiError> {
    let permissions = effective_permissions(pool, user_id).await?;
    Ok(permission_names(&permissions).contains(permission_name))
}

pub fn permission_names(permissions: &[Permission]) -> BTreeSet<String> {
    permissions.iter().map(|p| p.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(name: &str, resource: &str, action: &str) -> Permission {
        Permission {
            id: Uuid::new_v4(),
            name: name.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            description: None,
        }
    }

    #[test]
    fn test_normalize_role_name() {
        assert_eq!(normalize_role_name("ADMIN"), "admin");
        assert_eq!(normalize_role_name("  Admin "), "admin");
        assert_eq!(normalize_role_name("subscriber"), "subscriber");
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" User@Example.COM "), "user@example.com");
    }

    #[test]
    fn test_dedup_permissions_unions_by_name() {
        // Two roles both granting read_posts: the union has one entry.
        let rows = vec![
            perm("read_posts", "posts", "read"),
            perm("manage_posts", "posts", "manage"),
            perm("read_posts", "posts", "read"),
            perm("read_resources", "resources", "read"),
        ];
        let deduped = dedup_permissions(rows);
        let names: Vec<&str> = deduped.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["manage_posts", "read_posts", "read_resources"]);
    }

    #[test]
    fn test_permission_names_is_a_set() {
        let perms = vec![
            perm("read_posts", "posts", "read"),
            perm("manage_posts", "posts", "manage"),
        ];
        let names = permission_names(&perms);
        assert!(names.contains("read_posts"));
        assert!(names.contains("manage_posts"));
        assert_eq!(names.len(), 2);
    }
}
