use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::auth::password::{hash_password, is_password_hashed, verify_password};
use crate::auth::repo::{Team, User, UserRole};
use crate::error::ApiError;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), ApiError> {
    let name = name.trim();
    if name.len() < 2 {
        return Err(ApiError::Validation(
            "user name must be at least 2 characters long".into(),
        ));
    }
    if name.len() > 50 {
        return Err(ApiError::Validation(
            "user name cannot exceed 50 characters".into(),
        ));
    }
    if !is_valid_email(email) {
        return Err(ApiError::Validation("invalid email address".into()));
    }
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters long".into(),
        ));
    }
    Ok(())
}

/// Guard chain shared by all owner-only actions on another user.
fn check_owner_action(approver: &User, target: &User) -> Result<(), ApiError> {
    if approver.role != UserRole::Owner {
        return Err(ApiError::InsufficientPermission);
    }
    if approver.team_id != target.team_id {
        return Err(ApiError::TeamMismatch);
    }
    Ok(())
}

fn check_approval(approver: &User, target: &User) -> Result<(), ApiError> {
    check_owner_action(approver, target)?;
    if target.is_active {
        return Err(ApiError::UserAlreadyActive);
    }
    Ok(())
}

/// `owner_count` is the team's current number of owners; demoting the last
/// one is rejected no matter how many non-owner members exist.
fn check_role_change(
    approver: &User,
    target: &User,
    new_role: UserRole,
    owner_count: i64,
) -> Result<(), ApiError> {
    check_owner_action(approver, target)?;
    if target.role == new_role {
        return Err(ApiError::RoleUnchanged(new_role.as_str().into()));
    }
    if target.role == UserRole::Owner && new_role == UserRole::User && owner_count <= 1 {
        return Err(ApiError::LastOwnerProtection);
    }
    Ok(())
}

/// Login decision. Unknown user and wrong password collapse to the identical
/// `AuthenticationFailed`; the active check runs before the password verdict,
/// so a pending account reads as `UserNotActive` no matter what was typed.
fn check_login(user: Option<User>, password_ok: bool) -> Result<User, ApiError> {
    let user = user.ok_or(ApiError::AuthenticationFailed)?;
    if !user.is_active {
        return Err(ApiError::UserNotActive);
    }
    if !password_ok {
        return Err(ApiError::AuthenticationFailed);
    }
    Ok(user)
}

fn check_deactivation(approver: &User, target: &User, owner_count: i64) -> Result<(), ApiError> {
    check_owner_action(approver, target)?;
    if !target.is_active {
        return Err(ApiError::Validation("user is already inactive".into()));
    }
    if target.role == UserRole::Owner && owner_count <= 1 {
        return Err(ApiError::LastOwnerProtection);
    }
    Ok(())
}

/// Creates a brand-new team together with its first user, who is always an
/// active owner. Both rows are written in one transaction.
pub async fn register_with_new_team(
    db: &PgPool,
    name: &str,
    email: &str,
    password: &str,
    team_name: &str,
) -> Result<(User, Team), ApiError> {
    validate_registration(name, email, password)?;
    let team_name = team_name.trim();
    if team_name.is_empty() {
        return Err(ApiError::Validation("team name cannot be empty".into()));
    }

    if User::exists_by_app_id(db, email).await? {
        return Err(ApiError::duplicate("User", email));
    }
    if Team::exists_by_name(db, team_name).await? {
        return Err(ApiError::duplicate("Team", team_name));
    }

    let hash = hash_password(password)?;

    let mut tx = db.begin().await.map_err(ApiError::from)?;
    let team = Team::create_tx(&mut tx, team_name).await?;
    let user = User::create_tx(
        &mut tx,
        name.trim(),
        email,
        &hash,
        UserRole::Owner,
        true,
        team.id,
    )
    .await?;
    tx.commit().await.map_err(ApiError::from)?;

    info!(user_id = %user.id, team_id = %team.id, "registered owner with new team");
    Ok((user, team))
}

/// Adds a user to an existing team. The user is always created with `user`
/// role and inactive, pending owner approval.
pub async fn register_for_existing_team(
    db: &PgPool,
    name: &str,
    email: &str,
    password: &str,
    team_id: Uuid,
) -> Result<(User, Team), ApiError> {
    validate_registration(name, email, password)?;

    if User::exists_by_app_id(db, email).await? {
        return Err(ApiError::duplicate("User", email));
    }
    let team = Team::find_by_id(db, team_id)
        .await?
        .ok_or(ApiError::not_found("Team"))?;
    if !team.is_active {
        return Err(ApiError::Validation(format!(
            "team '{}' is not active",
            team.name
        )));
    }

    let hash = hash_password(password)?;

    let mut tx = db.begin().await.map_err(ApiError::from)?;
    let user = User::create_tx(
        &mut tx,
        name.trim(),
        email,
        &hash,
        UserRole::User,
        false,
        team.id,
    )
    .await?;
    tx.commit().await.map_err(ApiError::from)?;

    info!(user_id = %user.id, team_id = %team.id, "registered pending user for existing team");
    Ok((user, team))
}

pub async fn authenticate(db: &PgPool, email: &str, password: &str) -> Result<User, ApiError> {
    let user = User::find_by_app_id(db, email).await?;
    // a stored value that is not an argon2 hash fails closed, never compared
    let password_ok = match &user {
        Some(u) if is_password_hashed(&u.app_password) => {
            verify_password(password, &u.app_password)?
        }
        _ => false,
    };
    check_login(user, password_ok)
}

/// Owner approves a pending same-team user, activating the account.
pub async fn approve_user(
    db: &PgPool,
    approver_id: Uuid,
    target_id: Uuid,
) -> Result<User, ApiError> {
    let mut tx = db.begin().await.map_err(ApiError::from)?;

    let target = User::find_by_id_tx(&mut tx, target_id)
        .await?
        .ok_or(ApiError::not_found("User"))?;
    let approver = User::find_by_id_tx(&mut tx, approver_id)
        .await?
        .ok_or(ApiError::not_found("User"))?;
    check_approval(&approver, &target)?;

    let updated = User::set_active_tx(&mut tx, target.id, true).await?;
    tx.commit().await.map_err(ApiError::from)?;

    info!(user_id = %updated.id, approver_id = %approver_id, "user approved");
    Ok(updated)
}

/// Owner changes a same-team user's role. A team always retains at least one
/// owner.
pub async fn change_user_role(
    db: &PgPool,
    approver_id: Uuid,
    target_id: Uuid,
    new_role: &str,
) -> Result<User, ApiError> {
    let role =
        UserRole::parse(new_role).ok_or_else(|| ApiError::InvalidRole(new_role.to_string()))?;

    let mut tx = db.begin().await.map_err(ApiError::from)?;

    let target = User::find_by_id_tx(&mut tx, target_id)
        .await?
        .ok_or(ApiError::not_found("User"))?;
    let approver = User::find_by_id_tx(&mut tx, approver_id)
        .await?
        .ok_or(ApiError::not_found("User"))?;
    let owner_count = User::count_owners_tx(&mut tx, target.team_id).await?;
    check_role_change(&approver, &target, role, owner_count)?;

    let updated = User::set_role_tx(&mut tx, target.id, role).await?;
    tx.commit().await.map_err(ApiError::from)?;

    info!(user_id = %updated.id, role = role.as_str(), "user role changed");
    Ok(updated)
}

/// Owner deactivates a same-team user. The sole owner cannot be deactivated.
pub async fn deactivate_user(
    db: &PgPool,
    approver_id: Uuid,
    target_id: Uuid,
) -> Result<User, ApiError> {
    let mut tx = db.begin().await.map_err(ApiError::from)?;

    let target = User::find_by_id_tx(&mut tx, target_id)
        .await?
        .ok_or(ApiError::not_found("User"))?;
    let approver = User::find_by_id_tx(&mut tx, approver_id)
        .await?
        .ok_or(ApiError::not_found("User"))?;
    let owner_count = User::count_owners_tx(&mut tx, target.team_id).await?;
    check_deactivation(&approver, &target, owner_count)?;

    let updated = User::set_active_tx(&mut tx, target.id, false).await?;
    tx.commit().await.map_err(ApiError::from)?;

    info!(user_id = %updated.id, "user deactivated");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn user(role: UserRole, active: bool, team: Uuid) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            name: "someone".into(),
            app_id: format!("{}@x.com", Uuid::new_v4()),
            app_password: "$argon2id$test".into(),
            role,
            is_active: active,
            team_id: team,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("alice@x.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email("alice@nodot"));
    }

    #[test]
    fn registration_input_validation() {
        assert!(validate_registration("alice", "alice@x.com", "longenough").is_ok());
        assert!(validate_registration("a", "alice@x.com", "longenough").is_err());
        assert!(validate_registration(&"x".repeat(51), "alice@x.com", "longenough").is_err());
        assert!(validate_registration("alice", "not-an-email", "longenough").is_err());
        assert!(validate_registration("alice", "alice@x.com", "short").is_err());
    }

    #[test]
    fn non_owner_cannot_approve() {
        let team = Uuid::new_v4();
        let approver = user(UserRole::User, true, team);
        let target = user(UserRole::User, false, team);
        assert!(matches!(
            check_approval(&approver, &target).unwrap_err(),
            ApiError::InsufficientPermission
        ));
    }

    #[test]
    fn cross_team_approval_is_rejected() {
        let approver = user(UserRole::Owner, true, Uuid::new_v4());
        let target = user(UserRole::User, false, Uuid::new_v4());
        assert!(matches!(
            check_approval(&approver, &target).unwrap_err(),
            ApiError::TeamMismatch
        ));
    }

    #[test]
    fn approving_active_user_is_rejected() {
        let team = Uuid::new_v4();
        let approver = user(UserRole::Owner, true, team);
        let target = user(UserRole::User, true, team);
        assert!(matches!(
            check_approval(&approver, &target).unwrap_err(),
            ApiError::UserAlreadyActive
        ));
    }

    #[test]
    fn pending_user_can_be_approved_by_same_team_owner() {
        let team = Uuid::new_v4();
        let approver = user(UserRole::Owner, true, team);
        let target = user(UserRole::User, false, team);
        assert!(check_approval(&approver, &target).is_ok());
    }

    #[test]
    fn last_owner_cannot_be_demoted() {
        let team = Uuid::new_v4();
        let owner = user(UserRole::Owner, true, team);
        // self-demotion of the sole owner, regardless of member count
        assert!(matches!(
            check_role_change(&owner, &owner, UserRole::User, 1).unwrap_err(),
            ApiError::LastOwnerProtection
        ));
    }

    #[test]
    fn owner_can_be_demoted_when_another_owner_remains() {
        let team = Uuid::new_v4();
        let approver = user(UserRole::Owner, true, team);
        let target = user(UserRole::Owner, true, team);
        assert!(check_role_change(&approver, &target, UserRole::User, 2).is_ok());
    }

    #[test]
    fn promoting_a_user_never_trips_owner_protection() {
        let team = Uuid::new_v4();
        let approver = user(UserRole::Owner, true, team);
        let target = user(UserRole::User, true, team);
        assert!(check_role_change(&approver, &target, UserRole::Owner, 1).is_ok());
    }

    #[test]
    fn noop_role_change_is_rejected() {
        let team = Uuid::new_v4();
        let approver = user(UserRole::Owner, true, team);
        let target = user(UserRole::User, true, team);
        assert!(matches!(
            check_role_change(&approver, &target, UserRole::User, 1).unwrap_err(),
            ApiError::RoleUnchanged(_)
        ));
    }

    #[test]
    fn login_with_unknown_user_fails() {
        assert!(matches!(
            check_login(None, false).unwrap_err(),
            ApiError::AuthenticationFailed
        ));
    }

    #[test]
    fn pending_user_cannot_log_in_even_with_correct_password() {
        let pending = user(UserRole::User, false, Uuid::new_v4());
        assert!(matches!(
            check_login(Some(pending), true).unwrap_err(),
            ApiError::UserNotActive
        ));
    }

    #[test]
    fn active_check_precedes_password_check() {
        // a pending account reads as not-active, not as bad credentials
        let pending = user(UserRole::User, false, Uuid::new_v4());
        assert!(matches!(
            check_login(Some(pending), false).unwrap_err(),
            ApiError::UserNotActive
        ));
    }

    #[test]
    fn wrong_password_is_indistinguishable_from_unknown_user() {
        let active = user(UserRole::User, true, Uuid::new_v4());
        let wrong = check_login(Some(active), false).unwrap_err();
        let unknown = check_login(None, false).unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.kind(), unknown.kind());
    }

    #[test]
    fn approval_unlocks_login() {
        let team = Uuid::new_v4();
        let owner = user(UserRole::Owner, true, team);
        let mut joiner = user(UserRole::User, false, team);

        assert!(matches!(
            check_login(Some(joiner.clone()), true).unwrap_err(),
            ApiError::UserNotActive
        ));

        check_approval(&owner, &joiner).expect("owner approves same-team user");
        joiner.is_active = true;
        assert!(check_login(Some(joiner), true).is_ok());
    }

    #[test]
    fn sole_owner_cannot_be_deactivated() {
        let team = Uuid::new_v4();
        let owner = user(UserRole::Owner, true, team);
        assert!(matches!(
            check_deactivation(&owner, &owner, 1).unwrap_err(),
            ApiError::LastOwnerProtection
        ));
    }
}
