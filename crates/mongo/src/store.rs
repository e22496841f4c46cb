//! `SessionStore` backed by MongoDB.
//!
//! Every write that depends on the session being open carries
//! `logout_at: null` in its filter, so a heartbeat racing a close or the
//! reaper either lands before it or matches nothing.
//!
//! Creating a session closes the user's open sessions before the insert and
//! sweeps again after it. The sweep keeps only the newest open session by
//! `(login_at, _id)`, so concurrent logins converge on one open session.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReturnDocument,
};
use mongodb::{Client, Collection, Database};
use presence_core::{
    ActiveSession, EndReason, Error, HeartbeatOutcome, NewSession, OrgId, Page, Result, Scope,
    Session, SessionId, SessionStore, TimeRange, UserId,
};
use tracing::{debug, info};

use crate::config::MongoConfig;
use crate::document::{from_bson_time, id_array, parse_id, to_bson_time, SessionDoc};

fn store_err(op: &'static str) -> impl FnOnce(mongodb::error::Error) -> Error {
    move |e| Error::store(op, e.to_string())
}

/// Whole seconds between two date expressions, computed server-side.
fn seconds_between(end: Bson, start: Bson) -> Document {
    doc! {
        "$toLong": { "$divide": [ { "$subtract": [end, start] }, 1000 ] }
    }
}

/// Ends a session at its last heartbeat.
fn close_as_inactive_pipeline() -> Vec<Document> {
    vec![doc! {
        "$set": {
            "logout_at": "$last_active_at",
            "end_reason": EndReason::Inactive.as_str(),
            "duration_secs": seconds_between("$last_active_at".into(), "$login_at".into()),
        }
    }]
}

/// Open sessions of `user_id` that sort below the given newest one.
fn superseded_filter(user_id: &str, login_at: mongodb::bson::DateTime, id: &str) -> Document {
    doc! {
        "user_id": user_id,
        "logout_at": Bson::Null,
        "$or": [
            { "login_at": { "$lt": login_at } },
            { "login_at": login_at, "_id": { "$lt": id } },
        ],
    }
}

#[derive(Clone)]
pub struct MongoSessionStore {
    database: Database,
    sessions: Collection<SessionDoc>,
}

impl MongoSessionStore {
    pub async fn connect(config: &MongoConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.url)
            .await
            .map_err(store_err("mongo.connect"))?;
        options.app_name = Some("presence-engine".to_string());
        options.server_selection_timeout =
            Some(Duration::from_secs(config.server_selection_timeout_secs));
        let client = Client::with_options(options).map_err(store_err("mongo.connect"))?;

        info!(
            database = %config.database,
            collection = %config.collection,
            "Created MongoDB client"
        );
        Ok(Self::from_client(&client, config))
    }

    pub fn from_client(client: &Client, config: &MongoConfig) -> Self {
        let database = client.database(&config.database);
        let sessions = database.collection::<SessionDoc>(&config.collection);
        Self { database, sessions }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn collection(&self) -> &Collection<SessionDoc> {
        &self.sessions
    }

    async fn find_sessions(
        &self,
        op: &'static str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Session>> {
        let docs: Vec<SessionDoc> = self
            .sessions
            .find(filter, options)
            .await
            .map_err(store_err(op))?
            .try_collect()
            .await
            .map_err(store_err(op))?;
        docs.into_iter().map(Session::try_from).collect()
    }
}

fn newest_first(page: Page) -> FindOptions {
    FindOptions::builder()
        .sort(doc! { "login_at": -1, "_id": -1 })
        .skip(page.offset)
        .limit(page.limit as i64)
        .build()
}

#[async_trait]
impl SessionStore for MongoSessionStore {
    async fn create(&self, new: NewSession, now: DateTime<Utc>) -> Result<Session> {
        let forced = self
            .sessions
            .update_many(
                doc! { "user_id": new.user_id.to_string(), "logout_at": Bson::Null },
                close_as_inactive_pipeline(),
                None,
            )
            .await
            .map_err(store_err("sessions.force_close"))?;
        if forced.modified_count > 0 {
            debug!(
                user_id = %new.user_id,
                closed = forced.modified_count,
                "Force-closed open sessions before create"
            );
        }

        let session = Session::open(new, now);
        self.sessions
            .insert_one(SessionDoc::from(&session), None)
            .await
            .map_err(store_err("sessions.create"))?;

        // A concurrent create may have inserted between our close and insert.
        let newest = self
            .sessions
            .find_one(
                doc! { "user_id": session.user_id.to_string(), "logout_at": Bson::Null },
                FindOneOptions::builder()
                    .sort(doc! { "login_at": -1, "_id": -1 })
                    .build(),
            )
            .await
            .map_err(store_err("sessions.create"))?;
        let Some(newest) = newest else {
            return self.get(session.id).await.map(|s| s.unwrap_or(session));
        };

        let swept = self
            .sessions
            .update_many(
                superseded_filter(&newest.user_id, newest.login_at, &newest.id),
                close_as_inactive_pipeline(),
                None,
            )
            .await
            .map_err(store_err("sessions.force_close"))?;
        if swept.modified_count > 0 {
            debug!(
                user_id = %session.user_id,
                closed = swept.modified_count,
                kept = %newest.id,
                "Closed sessions superseded by a concurrent create"
            );
        }

        if newest.id == session.id.to_string() {
            Ok(session)
        } else {
            Ok(self.get(session.id).await?.unwrap_or(session))
        }
    }

    async fn update_heartbeat(
        &self,
        id: SessionId,
        page: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<HeartbeatOutcome> {
        let mut set = doc! { "last_active_at": to_bson_time(now) };
        if let Some(page) = page {
            set.insert("current_page", page);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .projection(doc! { "current_page": 1 })
            .build();
        let before = self
            .sessions
            .clone_with_type::<Document>()
            .find_one_and_update(
                doc! { "_id": id.to_string(), "logout_at": Bson::Null },
                doc! { "$set": set },
                options,
            )
            .await
            .map_err(store_err("sessions.heartbeat"))?;

        Ok(match before {
            Some(doc) => HeartbeatOutcome {
                applied: true,
                previous_page: doc
                    .get_str("current_page")
                    .ok()
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            },
            None => HeartbeatOutcome::default(),
        })
    }

    async fn close(&self, id: SessionId, reason: EndReason, now: DateTime<Utc>) -> Result<bool> {
        let at = to_bson_time(now);
        let pipeline = vec![doc! {
            "$set": {
                "logout_at": at,
                "end_reason": reason.as_str(),
                "duration_secs": seconds_between(Bson::DateTime(at), "$login_at".into()),
            }
        }];
        let result = self
            .sessions
            .update_one(
                doc! { "_id": id.to_string(), "logout_at": Bson::Null },
                pipeline,
                None,
            )
            .await
            .map_err(store_err("sessions.close"))?;
        Ok(result.modified_count > 0)
    }

    async fn close_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = self
            .sessions
            .update_many(
                doc! {
                    "logout_at": Bson::Null,
                    "last_active_at": { "$lt": to_bson_time(cutoff) },
                },
                close_as_inactive_pipeline(),
                None,
            )
            .await
            .map_err(store_err("sessions.close_inactive"))?;
        Ok(result.modified_count)
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>> {
        self.sessions
            .find_one(doc! { "_id": id.to_string() }, None)
            .await
            .map_err(store_err("sessions.get"))?
            .map(Session::try_from)
            .transpose()
    }

    async fn active_for_users(&self, users: &[UserId]) -> Result<HashMap<UserId, ActiveSession>> {
        const OP: &str = "sessions.active_for_users";
        if users.is_empty() {
            return Ok(HashMap::new());
        }

        let pipeline = vec![
            doc! { "$match": { "user_id": { "$in": id_array(users) }, "logout_at": Bson::Null } },
            doc! { "$sort": { "last_active_at": -1 } },
            doc! {
                "$group": {
                    "_id": "$user_id",
                    "session_id": { "$first": "$_id" },
                    "last_active_at": { "$first": "$last_active_at" },
                    "current_page": { "$first": "$current_page" },
                }
            },
        ];
        let docs: Vec<Document> = self
            .sessions
            .aggregate(pipeline, None)
            .await
            .map_err(store_err(OP))?
            .try_collect()
            .await
            .map_err(store_err(OP))?;

        let mut out = HashMap::with_capacity(docs.len());
        for doc in docs {
            let field = |e: mongodb::bson::document::ValueAccessError| Error::store(OP, e.to_string());
            let user_id = parse_id(OP, doc.get_str("_id").map_err(field)?)?;
            let session_id = parse_id(OP, doc.get_str("session_id").map_err(field)?)?;
            let last_active_at = from_bson_time(OP, *doc.get_datetime("last_active_at").map_err(field)?)?;
            let current_page = doc
                .get_str("current_page")
                .ok()
                .filter(|p| !p.is_empty())
                .map(str::to_string);
            out.insert(
                user_id,
                ActiveSession {
                    session_id,
                    user_id,
                    last_active_at,
                    current_page,
                },
            );
        }
        Ok(out)
    }

    async fn by_user(&self, user: UserId, page: Page) -> Result<Vec<Session>> {
        self.find_sessions(
            "sessions.by_user",
            doc! { "user_id": user.to_string() },
            newest_first(page),
        )
        .await
    }

    async fn by_user_since(
        &self,
        user: UserId,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Session>> {
        self.find_sessions(
            "sessions.by_user_since",
            doc! { "user_id": user.to_string(), "login_at": { "$gte": to_bson_time(since) } },
            newest_first(Page::first(limit)),
        )
        .await
    }

    async fn by_organization(&self, org: OrgId, page: Page) -> Result<Vec<Session>> {
        self.find_sessions(
            "sessions.by_organization",
            doc! { "organization_id": org.to_string() },
            newest_first(page),
        )
        .await
    }

    async fn count_active_in_organization(
        &self,
        org: OrgId,
        active_since: DateTime<Utc>,
    ) -> Result<u64> {
        self.sessions
            .count_documents(
                doc! {
                    "organization_id": org.to_string(),
                    "logout_at": Bson::Null,
                    "last_active_at": { "$gte": to_bson_time(active_since) },
                },
                None,
            )
            .await
            .map_err(store_err("sessions.count_active"))
    }

    async fn in_range(&self, scope: &Scope, range: TimeRange) -> Result<Vec<Session>> {
        if scope.is_empty_selection() {
            return Ok(Vec::new());
        }

        let mut filter = doc! {
            "login_at": { "$gte": to_bson_time(range.start), "$lt": to_bson_time(range.end) },
        };
        if let Some(users) = &scope.user_ids {
            filter.insert("user_id", doc! { "$in": id_array(users) });
        }
        if let Some(org) = scope.organization_id {
            filter.insert("organization_id", org.to_string());
        }

        let options = FindOptions::builder()
            .sort(doc! { "login_at": -1, "_id": -1 })
            .build();
        self.find_sessions("sessions.in_range", filter, options).await
    }
}
