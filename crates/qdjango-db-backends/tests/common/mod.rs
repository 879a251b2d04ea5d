//! Shared fixtures for the SQLite integration tests: the authentication
//! models and their tables.

#![allow(dead_code)]

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use qdjango_core::DjangoResult;
use qdjango_db::executor::{fetch_related, DbExecutor};
use qdjango_db::fields::{FieldDef, FieldType};
use qdjango_db::model::{Accessors, Model, ModelMeta};
use qdjango_db::query::compiler::DatabaseBackendType;
use qdjango_db::Database;
use qdjango_db_backends::SqliteBackend;

// ── Models ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: NaiveDateTime,
    pub last_login: NaiveDateTime,
}

impl User {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            is_active: true,
            ..Self::default()
        }
    }
}

impl Model for User {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "User",
                "user",
                vec![
                    FieldDef::new("username", FieldType::CharField).max_length(30),
                    FieldDef::new("first_name", FieldType::CharField).max_length(30),
                    FieldDef::new("last_name", FieldType::CharField).max_length(30),
                    FieldDef::new("email", FieldType::CharField).max_length(75),
                    FieldDef::new("password", FieldType::CharField).max_length(128),
                    FieldDef::new("is_active", FieldType::BooleanField),
                    FieldDef::new("is_staff", FieldType::BooleanField),
                    FieldDef::new("is_superuser", FieldType::BooleanField),
                    FieldDef::new("date_joined", FieldType::DateTimeField),
                    FieldDef::new("last_login", FieldType::DateTimeField),
                ],
            )
        });
        &META
    }

    fn accessors() -> &'static Accessors<Self> {
        static ACCESSORS: LazyLock<Accessors<User>> = LazyLock::new(|| {
            Accessors::<User>::new()
                .field("id", |u| &u.id, |u| &mut u.id)
                .field("username", |u| &u.username, |u| &mut u.username)
                .field("first_name", |u| &u.first_name, |u| &mut u.first_name)
                .field("last_name", |u| &u.last_name, |u| &mut u.last_name)
                .field("email", |u| &u.email, |u| &mut u.email)
                .field("password", |u| &u.password, |u| &mut u.password)
                .field("is_active", |u| &u.is_active, |u| &mut u.is_active)
                .field("is_staff", |u| &u.is_staff, |u| &mut u.is_staff)
                .field("is_superuser", |u| &u.is_superuser, |u| &mut u.is_superuser)
                .field("date_joined", |u| &u.date_joined, |u| &mut u.date_joined)
                .field("last_login", |u| &u.last_login, |u| &mut u.last_login)
        });
        &ACCESSORS
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

impl Model for Group {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "Group",
                "group",
                vec![FieldDef::new("name", FieldType::CharField).max_length(80)],
            )
        });
        &META
    }

    fn accessors() -> &'static Accessors<Self> {
        static ACCESSORS: LazyLock<Accessors<Group>> = LazyLock::new(|| {
            Accessors::<Group>::new()
                .field("id", |g| &g.id, |g| &mut g.id)
                .field("name", |g| &g.name, |g| &mut g.name)
        });
        &ACCESSORS
    }
}

#[derive(Debug, Default)]
pub struct UserGroups {
    pub id: i64,
    pub user_id: i64,
    pub group_id: i64,
    pub user: Option<Box<User>>,
    pub group: Option<Box<Group>>,
}

impl Model for UserGroups {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "UserGroups",
                "user_groups",
                vec![
                    FieldDef::foreign_key("user", "User"),
                    FieldDef::foreign_key("group", "Group"),
                ],
            )
        });
        &META
    }

    fn accessors() -> &'static Accessors<Self> {
        static ACCESSORS: LazyLock<Accessors<UserGroups>> = LazyLock::new(|| {
            Accessors::<UserGroups>::new()
                .field("id", |ug| &ug.id, |ug| &mut ug.id)
                .field("user", |ug| &ug.user_id, |ug| &mut ug.user_id)
                .field("group", |ug| &ug.group_id, |ug| &mut ug.group_id)
                .related("user", |ug| &mut ug.user)
                .related("group", |ug| &mut ug.group)
        });
        &ACCESSORS
    }
}

#[derive(Debug, Default)]
pub struct Message {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    pub user: Option<Box<User>>,
}

impl Message {
    pub fn new(user_id: i64, text: &str) -> Self {
        Self {
            user_id,
            text: text.to_string(),
            ..Self::default()
        }
    }

    /// Returns the author, loading it when it was not fetched eagerly.
    pub fn author(&self, db: &dyn DbExecutor) -> DjangoResult<Option<User>> {
        match &self.user {
            Some(user) => Ok(Some((**user).clone())),
            None => fetch_related(db, self.user_id),
        }
    }
}

impl Model for Message {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "Message",
                "message",
                vec![
                    FieldDef::foreign_key("user", "User"),
                    FieldDef::new("text", FieldType::TextField),
                ],
            )
        });
        &META
    }

    fn accessors() -> &'static Accessors<Self> {
        static ACCESSORS: LazyLock<Accessors<Message>> = LazyLock::new(|| {
            Accessors::<Message>::new()
                .field("id", |m| &m.id, |m| &mut m.id)
                .field("user", |m| &m.user_id, |m| &mut m.user_id)
                .field("text", |m| &m.text, |m| &mut m.text)
                .related("user", |m| &mut m.user)
        });
        &ACCESSORS
    }
}

// ── Database setup ─────────────────────────────────────────────────────

pub fn datetime(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, min, s))
        .expect("valid fixture date")
}

/// Creates the fixture tables.
pub fn create_tables(db: &dyn DbExecutor) {
    let pk = format!(
        "\"id\" INTEGER PRIMARY KEY{}",
        DatabaseBackendType::SQLite.auto_increment_sql()
    );
    let statements = [
        format!(
            "CREATE TABLE \"user\" ({pk}, \
             \"username\" VARCHAR(30) NOT NULL UNIQUE, \
             \"first_name\" VARCHAR(30) NOT NULL, \
             \"last_name\" VARCHAR(30) NOT NULL, \
             \"email\" VARCHAR(75) NOT NULL, \
             \"password\" VARCHAR(128) NOT NULL, \
             \"is_active\" BOOLEAN NOT NULL, \
             \"is_staff\" BOOLEAN NOT NULL, \
             \"is_superuser\" BOOLEAN NOT NULL, \
             \"date_joined\" DATETIME NOT NULL, \
             \"last_login\" DATETIME NOT NULL)"
        ),
        format!("CREATE TABLE \"group\" ({pk}, \"name\" VARCHAR(80) NOT NULL)"),
        format!(
            "CREATE TABLE \"user_groups\" ({pk}, \
             \"user_id\" INTEGER NOT NULL REFERENCES \"user\" (\"id\"), \
             \"group_id\" INTEGER NOT NULL REFERENCES \"group\" (\"id\"))"
        ),
        format!(
            "CREATE TABLE \"message\" ({pk}, \
             \"user_id\" INTEGER NOT NULL REFERENCES \"user\" (\"id\"), \
             \"text\" TEXT NOT NULL)"
        ),
    ];
    for sql in &statements {
        db.execute_sql(sql, &[]).expect("create fixture table");
    }
}

/// Opens a fresh in-memory database with the fixture tables.
pub fn setup_db() -> Database {
    let db = Database::new(SqliteBackend::memory().expect("open in-memory database"));
    create_tables(&db);
    db
}
