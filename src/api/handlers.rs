// API Handlers
//
// Each handler locks the connection inside a plain block and releases it
// before publishing updates, so no guard is ever held across an await.
// A mutation and its audit event commit in one transaction.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    Form, Json,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{AppState, CurrentUser};
use crate::apportion::DebitSheet;
use crate::auth::{self, LoginToken};
use crate::db::{self, Event};
use crate::entities::{
    Board, Category, Member, NewBoard, NewCategory, NewMember, NewProduct, NewUser, Product, Role,
    User,
};
use crate::error::Result;

const LOGIN_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: String,
}

impl IdResponse {
    fn json(id: impl Into<String>) -> Json<Self> {
        Json(IdResponse { id: id.into() })
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

// ============================================================================
// Helpers
// ============================================================================

/// Append to the audit trail inside the mutation's transaction
fn record(
    conn: &Connection,
    event_type: &str,
    entity_type: &str,
    entity_id: &str,
    data: Value,
    actor: &User,
) -> Result<()> {
    let event = Event::new(event_type, entity_type, entity_id, data, &actor.username);
    db::insert_event(conn, &event).map_err(|e| {
        warn!("Failed to record {event_type} event for {entity_id}: {e}");
        e
    })
}

fn load_board(state: &AppState, board_id: &str) -> Result<Board> {
    let conn = state.db()?;
    db::get_board(&conn, board_id)
}

/// Load, change and save a board together with its audit event, then
/// announce it
///
/// `change` returns the id of the item it touched.
fn update_board<F>(
    state: &AppState,
    actor: &User,
    board_id: &str,
    event_type: &str,
    change: F,
) -> Result<String>
where
    F: FnOnce(&mut Board) -> Result<String>,
{
    let item_id = {
        let conn = state.db()?;
        let tx = conn.unchecked_transaction()?;
        let mut board = db::get_board(&tx, board_id)?;
        let item_id = change(&mut board)?;
        db::save_board(&tx, &board)?;
        record(&tx, event_type, "board", board_id, json!({ "item_id": item_id }), actor)?;
        tx.commit()?;
        item_id
    };

    state.updates.publish(&["boards", board_id]);
    Ok(item_id)
}

// ============================================================================
// Session
// ============================================================================

/// GET /api/health - Health check
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

/// POST /api/login - form credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<LoginToken>> {
    // slows down password guessing
    tokio::time::sleep(LOGIN_DELAY).await;

    let conn = state.db()?;
    let token = auth::login(&conn, &form.username, &form.password, state.token_expire_hours)?;
    Ok(Json(token))
}

// ============================================================================
// Boards
// ============================================================================

/// GET /api/boards
pub async fn list_boards(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Board>>> {
    user.require(Role::Guest)?;
    let conn = state.db()?;
    Ok(Json(db::get_all_boards(&conn)?))
}

/// PUT /api/boards
pub async fn create_board(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(form): Json<NewBoard>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;
    let board = Board::new(&form)?;

    {
        let conn = state.db()?;
        let tx = conn.unchecked_transaction()?;
        db::insert_board(&tx, &board)?;
        let data = json!({ "name": board.name });
        record(&tx, "board_created", "board", &board.id, data, actor)?;
        tx.commit()?;
    }

    info!(board = %board.id, by = %actor.username, "board created");
    state.updates.publish(&["boards"]);
    Ok(IdResponse::json(board.id))
}

/// GET /api/boards/:id
pub async fn get_board(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<String>,
) -> Result<Json<Board>> {
    user.require(Role::Guest)?;
    Ok(Json(load_board(&state, &board_id)?))
}

/// POST /api/boards/:id - rename
pub async fn rename_board(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<String>,
    Json(form): Json<NewBoard>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;
    let id = update_board(&state, actor, &board_id, "board_renamed", |board| {
        board.rename(&form)?;
        Ok(board.id.clone())
    })?;
    Ok(IdResponse::json(id))
}

/// DELETE /api/boards/:id
pub async fn delete_board(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<String>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;

    {
        let conn = state.db()?;
        let tx = conn.unchecked_transaction()?;
        db::delete_board(&tx, &board_id)?;
        record(&tx, "board_deleted", "board", &board_id, Value::Null, actor)?;
        tx.commit()?;
    }
    state.debits.invalidate(&board_id);

    info!(board = %board_id, by = %actor.username, "board deleted");
    state.updates.publish(&["boards"]);
    Ok(IdResponse::json(board_id))
}

/// GET /api/boards/:id/debits - members sheet with debit and balance
pub async fn board_debits(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<String>,
) -> Result<Json<DebitSheet>> {
    user.require(Role::Guest)?;
    let board = load_board(&state, &board_id)?;
    let sheet = state.debits.get(&board);
    Ok(Json(sheet.as_ref().clone()))
}

/// GET /api/boards/:id/events - audit trail, newest first
pub async fn board_events(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<String>,
) -> Result<Json<Vec<Event>>> {
    user.require(Role::Guest)?;
    let conn = state.db()?;
    Ok(Json(db::get_events_for_entity(&conn, "board", &board_id)?))
}

// ============================================================================
// Categories
// ============================================================================

pub async fn list_categories(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<String>,
) -> Result<Json<Vec<Category>>> {
    user.require(Role::Guest)?;
    Ok(Json(load_board(&state, &board_id)?.categories))
}

pub async fn add_category(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<String>,
    Json(form): Json<NewCategory>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;
    let id = update_board(&state, actor, &board_id, "category_added", |board| {
        board.add_category(&form)
    })?;
    Ok(IdResponse::json(id))
}

pub async fn edit_category(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((board_id, category_id)): Path<(String, String)>,
    Json(form): Json<NewCategory>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;
    let id = update_board(&state, actor, &board_id, "category_edited", |board| {
        board.edit_category(&category_id, &form)
    })?;
    Ok(IdResponse::json(id))
}

/// Removing a category also strips it from every product and member
pub async fn remove_category(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((board_id, category_id)): Path<(String, String)>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;
    let id = update_board(&state, actor, &board_id, "category_removed", |board| {
        board.remove_category(&category_id)
    })?;
    Ok(IdResponse::json(id))
}

// ============================================================================
// Members
// ============================================================================

pub async fn list_members(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<String>,
) -> Result<Json<Vec<Member>>> {
    user.require(Role::Guest)?;
    Ok(Json(load_board(&state, &board_id)?.members))
}

pub async fn add_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<String>,
    Json(form): Json<NewMember>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;
    let id = update_board(&state, actor, &board_id, "member_added", |board| {
        board.add_member(&form)
    })?;
    Ok(IdResponse::json(id))
}

pub async fn edit_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((board_id, member_id)): Path<(String, String)>,
    Json(form): Json<NewMember>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;
    let id = update_board(&state, actor, &board_id, "member_edited", |board| {
        board.edit_member(&member_id, &form)
    })?;
    Ok(IdResponse::json(id))
}

pub async fn remove_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((board_id, member_id)): Path<(String, String)>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;
    let id = update_board(&state, actor, &board_id, "member_removed", |board| {
        board.remove_member(&member_id)
    })?;
    Ok(IdResponse::json(id))
}

// ============================================================================
// Products
// ============================================================================

pub async fn list_products(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<String>,
) -> Result<Json<Vec<Product>>> {
    user.require(Role::Guest)?;
    Ok(Json(load_board(&state, &board_id)?.products))
}

pub async fn add_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<String>,
    Json(form): Json<NewProduct>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;
    let id = update_board(&state, actor, &board_id, "product_added", |board| {
        board.add_product(&form)
    })?;
    Ok(IdResponse::json(id))
}

pub async fn edit_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((board_id, product_id)): Path<(String, String)>,
    Json(form): Json<NewProduct>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;
    let id = update_board(&state, actor, &board_id, "product_edited", |board| {
        board.edit_product(&product_id, &form)
    })?;
    Ok(IdResponse::json(id))
}

pub async fn remove_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((board_id, product_id)): Path<(String, String)>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Editor)?;
    let id = update_board(&state, actor, &board_id, "product_removed", |board| {
        board.remove_product(&product_id)
    })?;
    Ok(IdResponse::json(id))
}

// ============================================================================
// Users (admin only)
// ============================================================================

pub async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<User>>> {
    user.require(Role::Admin)?;
    let conn = state.db()?;
    Ok(Json(db::get_all_users(&conn)?))
}

pub async fn create_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(form): Json<NewUser>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Admin)?;

    let created = {
        let conn = state.db()?;
        let tx = conn.unchecked_transaction()?;
        let created = auth::create_user(&tx, &form)?;
        let data = json!({ "username": created.username, "role": created.role });
        record(&tx, "user_created", "user", &created.id, data, actor)?;
        tx.commit()?;
        created
    };

    info!(user = %created.username, role = created.role.as_str(), "user created");
    state.updates.publish(&["users"]);
    Ok(IdResponse::json(created.id))
}

pub async fn get_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<User>> {
    user.require(Role::Admin)?;
    let conn = state.db()?;
    Ok(Json(db::get_user(&conn, &user_id)?))
}

/// POST /api/users/:id - an empty password keeps the current one
pub async fn edit_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<String>,
    Json(form): Json<NewUser>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Admin)?;

    {
        let conn = state.db()?;
        let tx = conn.unchecked_transaction()?;
        let edited = auth::edit_user(&tx, &user_id, &form)?;
        let data = json!({
            "username": edited.username,
            "role": edited.role,
            "password_changed": !form.password.is_empty(),
        });
        record(&tx, "user_edited", "user", &user_id, data, actor)?;
        tx.commit()?;
    }

    state.updates.publish(&["users"]);
    Ok(IdResponse::json(user_id))
}

pub async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<IdResponse>> {
    let actor = user.require(Role::Admin)?;

    {
        let conn = state.db()?;
        let tx = conn.unchecked_transaction()?;
        auth::remove_user(&tx, &user_id)?;
        record(&tx, "user_deleted", "user", &user_id, Value::Null, actor)?;
        tx.commit()?;
    }

    info!(user = %user_id, by = %actor.username, "user deleted");
    state.updates.publish(&["users"]);
    Ok(IdResponse::json(user_id))
}
