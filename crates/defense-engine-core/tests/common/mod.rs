//! Shared fixtures: a small user-account domain exercising the runtime the
//! way game-domain modules do.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use defense_engine_core::aggregate::{Aggregate, AggregateBase, AggregateRepository};
use defense_engine_core::command::{retry_on_conflict, CommandEnvelope, CommandHandler,
    DEFAULT_CONFLICT_RETRIES};
use defense_engine_core::context::RequestContext;
use defense_engine_core::error::{EngineError, EngineResult};
use defense_engine_core::event::{DomainEvent, EventEnvelope};
use defense_engine_core::projection::Projection;
use defense_engine_core::query::{QueryEnvelope, QueryHandler};
use defense_engine_core::read::{ReadModelRecord, ReadStore};

pub const USER_VIEW: &str = "user_view";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UserEvent {
    UserCreated { email: String, name: String },
    EmailChanged { email: String },
    UserRetired,
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserCreated { .. } => "user_created",
            UserEvent::EmailChanged { .. } => "email_changed",
            UserEvent::UserRetired => "user_retired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserState {
    pub email: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug)]
pub struct UserAggregate {
    base: AggregateBase<UserEvent>,
    pub state: UserState,
}

impl UserAggregate {
    pub fn create(&mut self, email: String, name: String) -> EngineResult<()> {
        if self.version() > 0 {
            return Err(EngineError::validation("user already exists"));
        }
        if email.is_empty() {
            return Err(EngineError::validation("email must not be empty"));
        }
        self.record(UserEvent::UserCreated { email, name });
        Ok(())
    }

    pub fn change_email(&mut self, email: String) -> EngineResult<()> {
        if !self.state.active {
            return Err(EngineError::validation("user is retired"));
        }
        self.record(UserEvent::EmailChanged { email });
        Ok(())
    }

    pub fn retire(&mut self) -> EngineResult<()> {
        if !self.state.active {
            return Err(EngineError::validation("user is already retired"));
        }
        self.record(UserEvent::UserRetired);
        Ok(())
    }
}

impl Aggregate for UserAggregate {
    type Event = UserEvent;

    fn aggregate_type() -> &'static str {
        "user"
    }

    fn new(id: Uuid) -> Self {
        Self {
            base: AggregateBase::new(id),
            state: UserState {
                email: String::new(),
                name: String::new(),
                active: false,
            },
        }
    }

    fn base(&self) -> &AggregateBase<Self::Event> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AggregateBase<Self::Event> {
        &mut self.base
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::UserCreated { email, name } => {
                self.state.email = email.clone();
                self.state.name = name.clone();
                self.state.active = true;
            }
            UserEvent::EmailChanged { email } => {
                self.state.email = email.clone();
            }
            UserEvent::UserRetired => {
                self.state.active = false;
            }
        }
    }

    fn snapshot_state(&self) -> EngineResult<serde_json::Value> {
        serde_json::to_value(&self.state).map_err(EngineError::from)
    }

    fn apply_snapshot_state(&mut self, state: &serde_json::Value) -> EngineResult<()> {
        self.state = serde_json::from_value(state.clone()).map_err(EngineError::from)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserPayload {
    pub email: String,
    pub name: String,
}

pub struct CreateUserHandler {
    pub repo: AggregateRepository<UserAggregate>,
}

#[async_trait]
impl CommandHandler for CreateUserHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let payload: CreateUserPayload = command.decode()?;
        let mut user = UserAggregate::new(command.aggregate_id);
        user.create(payload.email, payload.name)?;
        self.repo.save(ctx, &mut user).await?;
        Ok(json!({"userId": command.aggregate_id, "version": user.version()}))
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeEmailPayload {
    pub email: String,
}

pub struct ChangeEmailHandler {
    pub repo: AggregateRepository<UserAggregate>,
}

#[async_trait]
impl CommandHandler for ChangeEmailHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        command: CommandEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let payload: ChangeEmailPayload = command.decode()?;
        let user_id = command.aggregate_id;
        let version = retry_on_conflict(DEFAULT_CONFLICT_RETRIES, || {
            let email = payload.email.clone();
            async move {
                let mut user = self.repo.load(ctx, user_id).await?;
                user.change_email(email)?;
                self.repo.save(ctx, &mut user).await?;
                Ok(user.version())
            }
        })
        .await?;
        Ok(json!({"userId": user_id, "version": version}))
    }
}

/// Maintains one `user_view` record per user aggregate.
pub struct UserViewProjection;

#[async_trait]
impl Projection for UserViewProjection {
    fn name(&self) -> &str {
        "user_view"
    }

    fn event_types(&self) -> Vec<String> {
        vec![
            "user_created".to_string(),
            "email_changed".to_string(),
            "user_retired".to_string(),
        ]
    }

    async fn apply(
        &self,
        ctx: &RequestContext,
        event: &EventEnvelope,
        reads: &dyn ReadStore,
    ) -> EngineResult<()> {
        let id = event.aggregate_id.to_string();
        let domain: UserEvent = event.decode()?;
        let mut body = reads
            .get(ctx, USER_VIEW, &id)
            .await?
            .map(|record| record.body)
            .unwrap_or_else(|| json!({"id": id, "status": "active"}));

        match domain {
            UserEvent::UserCreated { email, name } => {
                body["email"] = json!(email);
                body["name"] = json!(name);
                body["status"] = json!("active");
            }
            UserEvent::EmailChanged { email } => {
                body["email"] = json!(email);
            }
            UserEvent::UserRetired => {
                body["status"] = json!("retired");
            }
        }
        body["version"] = json!(event.aggregate_version);

        reads
            .save(
                ctx,
                ReadModelRecord::new(USER_VIEW, id, body).with_version(event.aggregate_version),
            )
            .await
    }

    async fn reset(&self, ctx: &RequestContext, reads: &dyn ReadStore) -> EngineResult<()> {
        reads.delete_by_type(ctx, USER_VIEW).await?;
        Ok(())
    }
}

pub struct GetUserByIdHandler {
    pub reads: Arc<dyn ReadStore>,
}

#[async_trait]
impl QueryHandler for GetUserByIdHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        query: QueryEnvelope,
    ) -> EngineResult<serde_json::Value> {
        let id = query
            .filters
            .get("id")
            .map(|predicate| predicate.value.clone())
            .and_then(|value| value.as_str().map(str::to_string))
            .ok_or_else(|| EngineError::validation("GetUserById requires an 'id' filter"))?;

        match self.reads.get(ctx, USER_VIEW, &id).await? {
            Some(record) => Ok(record.body),
            None => {
                let aggregate_id = Uuid::parse_str(&id)
                    .map_err(|_| EngineError::validation("malformed user id"))?;
                Err(EngineError::AggregateNotFound { aggregate_id })
            }
        }
    }
}
