//! Handler Set (spec §4.5): one handler per request type, composing the
//! Credential Store, Sync Counter Engine, and Storage Gateway.
//!
//! Handlers never raise past the envelope (spec §7): [`handle`] always
//! returns a [`ResponseEnvelope`], converting any error into its wire-level
//! [`ApiErrorCode`] and logging server-faults with full context.

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::Value;

use crate::config::Config;
use crate::credentials::{self, Client, User};
use crate::db::Storage;
use crate::error::{ApiErrorCode, CredentialError, Error, ProtocolError};
use crate::objects;
use crate::protocol::{
    AccountModifyBody, AccountOpenBody, Credentials, ParsedBody, ParsedRequest, RequestType,
    ResponseEnvelope, SyncDownBody, SyncUpBody,
};
use crate::sync;

/// Shared, per-process application state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub config: Arc<Config>,
}

/// Dispatches a parsed request to its handler and packs the result into a
/// response envelope. This is the only entry point the HTTP layer calls.
pub async fn handle(state: &AppState, request: ParsedRequest) -> ResponseEnvelope {
    let request_type = request.request_type;
    match dispatch(state, request).await {
        Ok(envelope) => envelope,
        Err(err) => {
            let code = ApiErrorCode::from(&err);
            if code == ApiErrorCode::InternalServerError {
                tracing::error!(?request_type, error = %err, "request failed");
            }
            ResponseEnvelope::error(code)
        }
    }
}

async fn dispatch(state: &AppState, request: ParsedRequest) -> Result<ResponseEnvelope, Error> {
    match request.request_type {
        RequestType::Test => handle_test(state, request.credentials).await,
        RequestType::AccountOpen => {
            handle_account_open(state, request.credentials, request.body).await
        }
        RequestType::AccountClose => handle_account_close(state, request.credentials).await,
        RequestType::AccountModify => {
            handle_account_modify(state, request.credentials, request.body).await
        }
        RequestType::BaseDataDown => handle_base_data_down(request.body).await,
        RequestType::SyncDown => handle_sync_down(state, request.credentials, request.body).await,
        RequestType::SyncUp => handle_sync_up(state, request.credentials, request.body).await,
    }
}

/// Every authenticated request type's envelope parsing already guarantees
/// `credentials` is `Some`; this just makes that explicit at each call site
/// instead of repeating an `.expect(...)`.
fn require_credentials(credentials: Option<Credentials>) -> Result<Credentials, Error> {
    credentials.ok_or_else(|| {
        Error::Protocol(ProtocolError::MalformedRequest(
            "request type requires credentials".to_string(),
        ))
    })
}

async fn authenticate(
    state: &AppState,
    credentials: &Credentials,
) -> Result<(User, Vec<Client>), Error> {
    credentials::authenticate(
        &state.storage,
        &credentials.email,
        &credentials.password,
        &state.config.security,
    )
    .await
    .map_err(Error::Credential)
}

async fn handle_test(
    state: &AppState,
    credentials: Option<Credentials>,
) -> Result<ResponseEnvelope, Error> {
    let credentials = require_credentials(credentials)?;
    authenticate(state, &credentials).await?;
    Ok(ResponseEnvelope::success())
}

async fn handle_account_open(
    state: &AppState,
    credentials: Option<Credentials>,
    body: ParsedBody,
) -> Result<ResponseEnvelope, Error> {
    let credentials = require_credentials(credentials)?;
    let ParsedBody::AccountOpen(AccountOpenBody { client_uuid }) = body else {
        return Err(Error::Protocol(ProtocolError::MalformedRequest(
            "accountOpen requires a clientUUID body".to_string(),
        )));
    };

    credentials::create_user(
        &state.storage,
        &credentials.email,
        &credentials.password,
        client_uuid,
        &state.config.security,
    )
    .await
    .map_err(Error::Credential)?;

    Ok(ResponseEnvelope::success())
}

async fn handle_account_close(
    state: &AppState,
    credentials: Option<Credentials>,
) -> Result<ResponseEnvelope, Error> {
    let credentials = require_credentials(credentials)?;
    authenticate(state, &credentials).await?;
    credentials::delete_user(&state.storage, &credentials.email)
        .await
        .map_err(Error::Credential)?;
    Ok(ResponseEnvelope::success())
}

async fn handle_account_modify(
    state: &AppState,
    credentials: Option<Credentials>,
    body: ParsedBody,
) -> Result<ResponseEnvelope, Error> {
    let credentials = require_credentials(credentials)?;
    let ParsedBody::AccountModify(AccountModifyBody { email, password }) = body else {
        return Err(Error::Protocol(ProtocolError::MalformedRequest(
            "accountModify requires email and password fields".to_string(),
        )));
    };

    authenticate(state, &credentials).await?;

    let new_password = SecretString::from(password);
    credentials::modify_user(
        &state.storage,
        &credentials.email,
        &email,
        &new_password,
        &state.config.security,
    )
    .await
    .map_err(Error::Credential)?;

    Ok(ResponseEnvelope::success())
}

async fn handle_base_data_down(body: ParsedBody) -> Result<ResponseEnvelope, Error> {
    let ParsedBody::SyncDown(SyncDownBody { object_class, .. }) = body else {
        return Err(Error::Protocol(ProtocolError::MalformedRequest(
            "baseDataDown requires an objectClass body".to_string(),
        )));
    };
    // Resolving the class validates it's registered; unknown names are
    // MALFORMED_REQUEST (spec §4.4). The seed dataset itself is a
    // domain-layer concern this core treats as empty (spec §4.5).
    objects::lookup(&object_class).map_err(Error::Protocol)?;
    Ok(ResponseEnvelope {
        error: ApiErrorCode::Success.code(),
        objects: Some(Vec::new()),
        committed_sync_count: None,
    })
}

async fn handle_sync_down(
    state: &AppState,
    credentials: Option<Credentials>,
    body: ParsedBody,
) -> Result<ResponseEnvelope, Error> {
    let credentials = require_credentials(credentials)?;
    let ParsedBody::SyncDown(SyncDownBody {
        object_class,
        client_uuid,
        last_sync,
    }) = body
    else {
        return Err(Error::Protocol(ProtocolError::MalformedRequest(
            "syncDown requires an objectClass/clientUUID/lastSync body".to_string(),
        )));
    };

    let (user, _clients) = authenticate(state, &credentials).await?;
    credentials::resolve_client(&state.storage, user.id, client_uuid)
        .await
        .map_err(Error::Credential)?;

    let descriptor = objects::lookup(&object_class).map_err(Error::Protocol)?;

    let conn = state.storage.client().await.map_err(Error::Database)?;
    let watermark = sync::committed_sync_count(&conn, &object_class)
        .await
        .map_err(Error::SyncCount)?;

    let rows = conn
        .query(&descriptor.select_sql, &[&user.id, &last_sync, &watermark])
        .await
        .map_err(|e| Error::Database(crate::error::DatabaseError::classify(e)))?;

    let objects: Vec<Value> = rows.iter().map(|row| descriptor.row_to_json(row)).collect();

    Ok(ResponseEnvelope::with_objects(objects, watermark))
}

async fn handle_sync_up(
    state: &AppState,
    credentials: Option<Credentials>,
    body: ParsedBody,
) -> Result<ResponseEnvelope, Error> {
    let credentials = require_credentials(credentials)?;
    let ParsedBody::SyncUp(SyncUpBody {
        object_class,
        client_uuid,
        objects: uploaded,
    }) = body
    else {
        return Err(Error::Protocol(ProtocolError::MalformedRequest(
            "syncUp requires an objectClass/clientUUID/objects body".to_string(),
        )));
    };

    let (user, _clients) = authenticate(state, &credentials).await?;
    let client = credentials::resolve_client(&state.storage, user.id, client_uuid)
        .await
        .map_err(Error::Credential)?;

    let descriptor = objects::lookup(&object_class).map_err(Error::Protocol)?;

    let mut conn = state.storage.client().await.map_err(Error::Database)?;
    let session_sync_count =
        sync::reserve_session(&mut conn, &state.config.sync, &object_class)
            .await
            .map_err(Error::SyncCount)?;

    let write_result = write_uploaded_objects(
        &mut conn,
        descriptor,
        &uploaded,
        &client,
        user.id,
        session_sync_count,
    )
    .await;

    match write_result {
        Ok(()) => {}
        Err(err) => {
            // The data transaction failed before committing the session;
            // mark it committed out-of-band so it doesn't sit uncommitted
            // until the expiry reaper catches it (spec §4.3.2).
            let _ = mark_committed_out_of_band(&state.storage, session_sync_count).await;
            return Err(err);
        }
    }

    let conn = state.storage.client().await.map_err(Error::Database)?;
    let watermark = sync::committed_sync_count(&conn, &object_class)
        .await
        .map_err(Error::SyncCount)?;

    Ok(ResponseEnvelope::with_committed_sync_count(watermark))
}

async fn write_uploaded_objects(
    conn: &mut deadpool_postgres::Client,
    descriptor: &objects::ObjectClassDescriptor,
    uploaded: &[Value],
    client: &Client,
    owner_user_id: i32,
    session_sync_count: i64,
) -> Result<(), Error> {
    let txn = conn
        .transaction()
        .await
        .map_err(|e| Error::Database(crate::error::DatabaseError::classify(e)))?;

    for object in uploaded {
        let origin_client_object_id = object
            .get("originClientObjectId")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                Error::Protocol(ProtocolError::InvalidJson(
                    "uploaded object missing originClientObjectId".to_string(),
                ))
            })?;
        let deleted = object
            .get("deleted")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let extra = descriptor
            .extract_fields(object)
            .map_err(Error::Protocol)?;

        let params = objects::insert_params(
            &client.id,
            &origin_client_object_id,
            &client.id,
            &owner_user_id,
            &session_sync_count,
            &deleted,
            &extra,
        );

        txn.query(&descriptor.insert_sql, &params)
            .await
            .map_err(|e| Error::Database(crate::error::DatabaseError::classify(e)))?;
    }

    sync::mark_committed(&txn, session_sync_count)
        .await
        .map_err(Error::SyncCount)?;

    txn.commit()
        .await
        .map_err(|e| Error::Database(crate::error::DatabaseError::classify(e)))?;

    Ok(())
}

async fn mark_committed_out_of_band(
    storage: &Storage,
    session_sync_count: i64,
) -> Result<(), Error> {
    let conn = storage.client().await.map_err(Error::Database)?;
    conn.execute(
        "UPDATE sync_count SET is_committed = true WHERE sync_count = $1",
        &[&session_sync_count],
    )
    .await
    .map_err(|e| Error::Database(crate::error::DatabaseError::classify(e)))?;
    Ok(())
}
