use crate::errors::ApiError;
use crate::models::*;
use crate::registry::RootRecord;
use crate::state::AppState;
use access_core::cipher::Algorithm;
use access_core::merkle::MerkleTree;
use access_core::orchestrator::Decision;
use access_core::records::MedicalResult;
use access_core::{issuer, records, token, Hash32};
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use tower_http::cors::{Any, CorsLayer};

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v1/tokens/group", post(issue_group_token))
        .route("/api/v1/roots", post(publish_root))
        .route("/api/v1/roots/:root/revoke", post(revoke_root))
        .route("/api/v1/medical-results", post(create_medical_result))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/proofs", post(prove_membership))
        .route("/api/v1/access/verify", post(verify_access))
        .route("/api/v1/roots/:root", get(get_root))
        .route("/api/v1/roots/:root/access/:leaf", get(get_last_access))
        .route("/api/v1/medical-results/:wallet", get(list_medical_results))
        .route("/api/v1/medical-results/entity/:id", get(get_medical_result))
        .route("/api/v1/medical-results/decrypt", post(decrypt_medical_result))
        .merge(protected_routes)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn authorized(headers: &HeaderMap, expected_key: &str) -> bool {
    headers
        .get("X-API-KEY")
        .is_some_and(|provided_key| provided_key == expected_key)
}

async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if authorized(&headers, &state.config.api_key) {
        return Ok(next.run(request).await);
    }

    tracing::warn!(path = %request.uri().path(), "unauthorized access attempt");
    Err(StatusCode::UNAUTHORIZED)
}

async fn issue_group_token(
    State(state): State<AppState>,
    Json(req): Json<GroupTokenRequest>,
) -> Result<Json<GroupTokenResponse>, ApiError> {
    let (token, tree) = issuer::issue_group_token(&req.identities, req.message.as_bytes(), req.embed_identities)?;

    let published = match req.publish_as.as_deref() {
        Some(publisher) => {
            state.registry.publish_root(&tree.root(), publisher).await?;
            true
        }
        None => false,
    };

    tracing::info!(root = %tree.root(), members = tree.len(), published, "group token issued");

    Ok(Json(GroupTokenResponse {
        token: token::encode(&token)?,
        merkle_root: tree.root().to_prefixed_hex(),
        members: tree.len(),
        published,
    }))
}

async fn prove_membership(Json(req): Json<ProofRequest>) -> Result<Json<ProofResponse>, ApiError> {
    let tree = MerkleTree::build(&req.identities)?;
    let proof = tree.prove(&req.identity)?;

    Ok(Json(ProofResponse {
        leaf: proof.leaf.to_prefixed_hex(),
        root: proof.root.to_prefixed_hex(),
        siblings: proof.siblings.iter().map(Hash32::to_prefixed_hex).collect(),
    }))
}

async fn verify_access(
    State(state): State<AppState>,
    Json(req): Json<VerifyAccessRequest>,
) -> Result<Json<VerifyAccessResponse>, ApiError> {
    let proof = req
        .proof
        .as_ref()
        .map(|siblings| siblings.iter().map(|s| Hash32::from_hex(s)).collect::<Result<Vec<_>, _>>())
        .transpose()?;

    let decision = state
        .orchestrator
        .verify_encoded(&req.token, &req.identity, proof.as_deref())
        .await?;

    let res = match decision {
        Decision::Admitted { plaintext, local_only } => VerifyAccessResponse {
            admitted: true,
            local_only,
            reason: None,
            plaintext_b64: Some(base64::engine::general_purpose::STANDARD.encode(&plaintext)),
            plaintext_utf8: String::from_utf8(plaintext).ok(),
        },
        Decision::Denied(reason) => VerifyAccessResponse {
            admitted: false,
            local_only: false,
            reason: Some(reason),
            plaintext_b64: None,
            plaintext_utf8: None,
        },
    };

    Ok(Json(res))
}

async fn publish_root(
    State(state): State<AppState>,
    Json(req): Json<PublishRootRequest>,
) -> Result<Json<RootRecord>, ApiError> {
    if req.publisher.trim().is_empty() {
        return Err(ApiError::BadRequest("publisher must not be empty".to_string()));
    }
    let root = Hash32::from_hex(&req.root)?;
    Ok(Json(state.registry.publish_root(&root, req.publisher.trim()).await?))
}

async fn get_root(State(state): State<AppState>, Path(root): Path<String>) -> Result<Json<RootRecord>, ApiError> {
    let root = Hash32::from_hex(&root)?;
    let Some(record) = state.registry.get_root(&root).await? else {
        return Err(ApiError::NotFound("root not found".to_string()));
    };
    Ok(Json(record))
}

async fn revoke_root(State(state): State<AppState>, Path(root): Path<String>) -> Result<Json<RootRecord>, ApiError> {
    let root = Hash32::from_hex(&root)?;
    let Some(record) = state.registry.get_root(&root).await? else {
        return Err(ApiError::NotFound("root not found".to_string()));
    };
    if !record.is_active {
        return Err(ApiError::Conflict("root already revoked".to_string()));
    }

    state.registry.revoke_root(&root).await?;
    Ok(Json(RootRecord { is_active: false, ..record }))
}

async fn get_last_access(
    State(state): State<AppState>,
    Path((root, leaf)): Path<(String, String)>,
) -> Result<Json<LastAccessResponse>, ApiError> {
    let root = Hash32::from_hex(&root)?;
    let leaf = Hash32::from_hex(&leaf)?;
    let last_access = state.registry.last_access(&root, &leaf).await?;

    Ok(Json(LastAccessResponse {
        root: root.to_prefixed_hex(),
        leaf: leaf.to_prefixed_hex(),
        last_access,
    }))
}

async fn create_medical_result(
    State(state): State<AppState>,
    Json(req): Json<MedicalResultCreateRequest>,
) -> Result<Json<MedicalResultCreateResponse>, ApiError> {
    if req.doctor_id.trim().is_empty() {
        return Err(ApiError::BadRequest("doctor_id must not be empty".to_string()));
    }

    let algorithm = req.algorithm.unwrap_or(Algorithm::Aes256Cbc);
    let receipt = records::publish_result(
        state.ledger.as_ref(),
        &req.record,
        req.doctor_id.trim(),
        algorithm,
        state.config.result_ttl,
    )
    .await?;

    Ok(Json(MedicalResultCreateResponse { entity_id: receipt.id, tx_ref: receipt.tx_ref }))
}

async fn list_medical_results(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<MedicalResultListResponse>, ApiError> {
    let results = records::patient_results(state.ledger.as_ref(), &wallet).await?;
    Ok(Json(MedicalResultListResponse { wallet: wallet.trim().to_lowercase(), results }))
}

async fn get_medical_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MedicalResult>, ApiError> {
    let Some(result) = records::result_by_id(state.ledger.as_ref(), &id).await? else {
        return Err(ApiError::NotFound("medical result not found".to_string()));
    };
    Ok(Json(result))
}

async fn decrypt_medical_result(Json(req): Json<DecryptResultRequest>) -> Result<Json<DecryptResultResponse>, ApiError> {
    // Runs server-side only for clients that cannot decrypt locally; the wallet is not stored.
    let record = records::open_result(&req.encrypted_token, &req.wallet)?;
    Ok(Json(DecryptResultResponse { record }))
}
