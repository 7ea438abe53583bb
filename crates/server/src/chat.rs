//! Chat service: request preparation, provider selection, RAG injection,
//! failover, and response assembly for the unary and streaming paths.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, State};
use axum::response::Sse;
use axum::response::sse::Event;
use futures::StreamExt;
use secrecy::SecretString;
use tokio_stream::wrappers::ReceiverStream;

use auth::Permission;
use llm::{GenerateParams, Provider, StreamChunk};
use tenant::{ProviderConfig, TenantConfig};

use crate::AppState;
use crate::context::RequestContext;
use crate::error::ServiceError;
use crate::validation::validate_generate_request;
use crate::wire::{GenerateRequest, GenerateResponse, SelectProviderResponse};

/// A fully prepared request: merged config, resolved adapter, and the
/// provider-agnostic params.
struct Prepared {
    provider_name: String,
    adapter: Arc<dyn Provider>,
    params: GenerateParams,
}

/// Select the provider for a request: the preferred one when set and
/// enabled for this tenant, else the tenant default.
fn select<'a>(
    tenant_config: &'a TenantConfig,
    request: &GenerateRequest,
) -> Result<(&'a str, &'a ProviderConfig), ServiceError> {
    if let Some(preferred) = request.preferred_provider.as_deref()
        && !preferred.is_empty()
    {
        if let Some(config) = tenant_config.get_provider(preferred) {
            return Ok((preferred_name(tenant_config, preferred), config));
        }
        log::warn!("preferred provider '{preferred}' not enabled for tenant, using default");
    }

    tenant_config
        .default_provider()
        .ok_or_else(|| ServiceError::Unavailable("no enabled provider for tenant".to_string()))
}

/// Borrow the provider name with the tenant config's lifetime.
fn preferred_name<'a>(tenant_config: &'a TenantConfig, name: &str) -> &'a str {
    tenant_config
        .providers
        .keys()
        .find(|k| k.as_str() == name)
        .map(String::as_str)
        .unwrap_or_default()
}

/// Build the per-request provider config: a copy of the tenant's entry
/// with request-level overrides merged in. The tenant snapshot is never
/// mutated; `extra_options` lands in a fresh map.
async fn build_request_config(
    base: &ProviderConfig,
    request: &GenerateRequest,
    provider_name: &str,
    is_admin: bool,
) -> Result<ProviderConfig, ServiceError> {
    let mut config = base.clone();

    if let Some(overrides) = request.provider_configs.get(provider_name) {
        if let Some(api_key) = &overrides.api_key {
            config.api_key = SecretString::from(api_key.clone());
        }

        if let Some(base_url) = &overrides.base_url {
            if !is_admin {
                return Err(ServiceError::PermissionDenied);
            }
            url_guard::validate_url(base_url)
                .await
                .map_err(|e| ServiceError::InvalidArgument(format!("base_url: {e}")))?;
            config.base_url = Some(base_url.clone());
        }

        if let Some(model) = &overrides.model {
            config.model = model.clone();
        }
        if let Some(temperature) = overrides.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ServiceError::InvalidArgument(format!(
                    "temperature {temperature} out of [0, 2]"
                )));
            }
            config.temperature = Some(temperature);
        }
        if let Some(top_p) = overrides.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(ServiceError::InvalidArgument(format!("top_p {top_p} out of [0, 1]")));
            }
            config.top_p = Some(top_p);
        }
        if let Some(max_output_tokens) = overrides.max_output_tokens {
            config.max_output_tokens = Some(max_output_tokens);
        }

        for (key, value) in &overrides.extra_options {
            config.extra_options.insert(key.clone(), value.clone());
        }
    }

    if let Some(model) = &request.model_override {
        config.model = model.clone();
    }

    Ok(config)
}

/// Prepare a request end to end. One function feeds both the unary and
/// streaming paths so their behavior cannot diverge.
async fn prepare(
    state: &AppState,
    context: &RequestContext,
    request: &GenerateRequest,
    provider_choice: Option<&str>,
) -> Result<Prepared, ServiceError> {
    validate_generate_request(request)?;

    let (tenant_id, tenant_config) = context.require_tenant()?;
    let is_admin = context.client.allows(Permission::Admin);

    let (provider_name, base_config) = match provider_choice {
        Some(name) => {
            let config = tenant_config
                .get_provider(name)
                .ok_or_else(|| ServiceError::Unavailable("no enabled provider for tenant".to_string()))?;
            (name, config)
        }
        None => select(tenant_config, request)?,
    };
    let provider_name = provider_name.to_string();

    let adapter = state.registry.get(&provider_name).ok_or_else(|| {
        log::error!("tenant '{tenant_id}' references unknown provider '{provider_name}'");
        ServiceError::Unavailable("no enabled provider for tenant".to_string())
    })?;

    let config = build_request_config(base_config, request, &provider_name, is_admin).await?;

    // Continuity is provider-native. When the resolved provider cannot
    // continue a previous response, the replayed history carries the
    // conversation instead.
    let response_id = match &request.previous_response_id {
        Some(id) if !id.is_empty() => {
            if adapter.supports_native_continuity() {
                Some(id.clone())
            } else {
                log::warn!(
                    "provider '{provider_name}' does not support response continuity, replaying history instead"
                );
                None
            }
        }
        _ => None,
    };

    let mut instructions = request.instructions.clone();

    // RAG injection: retrieved chunks only ever reach the prompt inside
    // the wrapped document-context block.
    if request.enable_file_search
        && let Some(store_id) = request.file_store_id.as_deref().filter(|s| !s.is_empty())
        && let Some(rag) = &state.rag
    {
        let tenant_rag_enabled = tenant_config.rag.as_ref().is_none_or(|r| r.enabled);

        if tenant_rag_enabled {
            let top_k = tenant_config
                .rag
                .as_ref()
                .and_then(|r| r.top_k)
                .map(|k| k as i64)
                .unwrap_or(0);

            let chunks = rag.retrieve(tenant_id, store_id, &request.user_input, top_k).await?;

            if !chunks.is_empty() {
                let block = rag::wrap_document_context(&chunks);
                if instructions.is_empty() {
                    instructions = block;
                } else {
                    instructions = format!("{instructions}\n\n{block}");
                }
            }
        }
    }

    let debug = is_admin && request.metadata.get("debug").map(String::as_str) == Some("true");

    let params = GenerateParams {
        instructions,
        user_input: request.user_input.clone(),
        history: request.conversation_history.clone(),
        response_id,
        config,
        enable_file_search: request.enable_file_search && adapter.supports_file_search(),
        enable_web_search: request.enable_web_search && adapter.supports_web_search(),
        structured_output: request.structured_output.clone(),
        file_store_id: request.file_store_id.clone(),
        request_id: context.request_id.clone(),
        tenant_id: tenant_id.to_string(),
        client_id: context.client.client_id.clone(),
        debug,
    };

    Ok(Prepared {
        provider_name,
        adapter,
        params,
    })
}

/// The fallback provider for a failed request: the request's own choice
/// when enabled for the tenant, else the next enabled entry in the
/// failover order.
fn pick_fallback<'a>(
    tenant_config: &'a TenantConfig,
    request: &GenerateRequest,
    failed_provider: &str,
) -> Option<&'a str> {
    if let Some(requested) = request.fallback_provider.as_deref()
        && !requested.is_empty()
        && requested != failed_provider
    {
        if tenant_config.get_provider(requested).is_some() {
            return Some(preferred_name(tenant_config, requested));
        }
        log::warn!("requested fallback provider '{requested}' not enabled for tenant, skipping");
    }

    tenant_config.next_failover(failed_provider).map(|(name, _)| name)
}

fn sanitize(err: &llm::LlmError, params: &GenerateParams, provider: &str) -> String {
    llm::sanitize_for_client(err, &params.request_id, &params.tenant_id, &params.client_id, provider)
}

async fn record_usage(state: &AppState, context: &RequestContext, usage: llm::Usage) {
    // Best effort: the response already succeeded, and a TPM overrun is
    // recorded but surfaced only as a warning.
    match state
        .limiter
        .record_tokens(&context.client, i64::from(usage.total_tokens))
        .await
    {
        Ok(()) => {}
        Err(auth::RateLimitError::TpmExceeded { current, limit }) => {
            log::warn!(
                "client '{}' exceeded token budget: {current}/{limit} tokens this minute",
                context.client.client_id
            );
        }
        Err(e) => log::warn!("failed to record token usage: {e}"),
    }
}

/// `AiboxService.GenerateReply`.
pub(crate) async fn generate_reply(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ServiceError> {
    let prepared = prepare(&state, &context, &request, None).await?;

    match prepared.adapter.generate_reply(&prepared.params).await {
        Ok(result) => {
            record_usage(&state, &context, result.usage).await;

            Ok(Json(GenerateResponse {
                text: result.text,
                response_id: result.response_id,
                usage: result.usage,
                citations: result.citations,
                model: result.model,
                provider: result.provider,
                failed_over: false,
                original_provider: None,
                original_error: None,
                request_id: context.request_id.clone(),
            }))
        }
        Err(primary_err) => {
            let sanitized_primary = sanitize(&primary_err, &prepared.params, &prepared.provider_name);

            if !request.enable_failover {
                return Err(ServiceError::Unavailable(sanitized_primary));
            }

            let (_, tenant_config) = context.require_tenant()?;
            let Some(fallback_name) = pick_fallback(tenant_config, &request, &prepared.provider_name) else {
                return Err(ServiceError::Unavailable(sanitized_primary));
            };
            let fallback_name = fallback_name.to_string();

            log::info!(
                "failing over from '{}' to '{fallback_name}': request_id={}",
                prepared.provider_name,
                context.request_id
            );

            let fallback = prepare(&state, &context, &request, Some(&fallback_name)).await?;

            match fallback.adapter.generate_reply(&fallback.params).await {
                Ok(result) => {
                    record_usage(&state, &context, result.usage).await;

                    Ok(Json(GenerateResponse {
                        text: result.text,
                        response_id: result.response_id,
                        usage: result.usage,
                        citations: result.citations,
                        model: result.model,
                        provider: result.provider,
                        failed_over: true,
                        original_provider: Some(prepared.provider_name),
                        original_error: Some(sanitized_primary),
                        request_id: context.request_id.clone(),
                    }))
                }
                // Both failed: surface the sanitized primary error.
                Err(fallback_err) => {
                    log::error!(
                        "fallback provider '{fallback_name}' also failed: request_id={} error={fallback_err}",
                        context.request_id
                    );
                    Err(ServiceError::Unavailable(sanitized_primary))
                }
            }
        }
    }
}

/// `AiboxService.GenerateReplyStream`.
///
/// The adapter's chunks are relayed as Server-Sent Events. Indices are
/// re-tagged monotonically, exactly one terminal chunk is emitted, and a
/// retryable failure may restart on the fallback provider only while no
/// text has reached the caller.
pub(crate) async fn generate_reply_stream(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Json(request): Json<GenerateRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let prepared = prepare(&state, &context, &request, None).await?;

    let (tx, rx) = tokio::sync::mpsc::channel::<StreamChunk>(32);
    tokio::spawn(run_stream(state, context, request, prepared, tx));

    let events = ReceiverStream::new(rx).map(|chunk| {
        let json = serde_json::to_string(&chunk).unwrap_or_else(|e| {
            log::error!("failed to serialize stream chunk: {e}");
            r#"{"type":"error","code":"internal","message":"internal error","retryable":false}"#.to_string()
        });
        Ok(Event::default().data(json))
    });

    Ok(Sse::new(events))
}

/// Drives the upstream stream(s) and owns the failover decision. Runs
/// detached; a dropped client connection surfaces as a failed send and
/// tears the upstream call down with this task.
async fn run_stream(
    state: Arc<AppState>,
    context: RequestContext,
    request: GenerateRequest,
    prepared: Prepared,
    tx: tokio::sync::mpsc::Sender<StreamChunk>,
) {
    let mut provider_name = prepared.provider_name;
    let mut params = prepared.params;
    let mut adapter = prepared.adapter;
    let mut failover_done = false;

    let mut index: u64 = 0;
    let mut delta_emitted = false;

    'providers: loop {
        let mut stream = match adapter.generate_reply_stream(&params).await {
            Ok(stream) => stream,
            Err(err) => {
                let message = sanitize(&err, &params, &provider_name);

                // A stream that never started can fail over like a unary
                // call.
                if err.retryable()
                    && request.enable_failover
                    && !failover_done
                    && let Some(next) = next_stream_provider(&state, &context, &request, &provider_name).await
                {
                    (provider_name, params, adapter) = next;
                    failover_done = true;
                    continue 'providers;
                }

                let _ = tx
                    .send(StreamChunk::Error {
                        code: err.code().to_string(),
                        message,
                        retryable: false,
                    })
                    .await;
                return;
            }
        };

        while let Some(chunk) = stream.next().await {
            match chunk {
                StreamChunk::TextDelta { text, .. } => {
                    if tx.send(StreamChunk::TextDelta { text, index }).await.is_err() {
                        return;
                    }
                    index += 1;
                    delta_emitted = true;
                }
                StreamChunk::UsageUpdate { usage } => {
                    if tx.send(StreamChunk::UsageUpdate { usage }).await.is_err() {
                        return;
                    }
                }
                StreamChunk::CitationUpdate { citation } => {
                    if tx.send(StreamChunk::CitationUpdate { citation }).await.is_err() {
                        return;
                    }
                }
                StreamChunk::Complete {
                    response_id,
                    model,
                    provider,
                    final_usage,
                } => {
                    record_usage(&state, &context, final_usage).await;
                    let _ = tx
                        .send(StreamChunk::Complete {
                            response_id,
                            model,
                            provider,
                            final_usage,
                        })
                        .await;
                    return;
                }
                StreamChunk::Error { code, message, retryable } => {
                    // Restart on the fallback only while the caller has
                    // seen no text; afterwards the error surfaces.
                    if retryable
                        && request.enable_failover
                        && !failover_done
                        && !delta_emitted
                        && let Some(next) = next_stream_provider(&state, &context, &request, &provider_name).await
                    {
                        log::info!(
                            "restarting stream on fallback provider: request_id={}",
                            context.request_id
                        );
                        (provider_name, params, adapter) = next;
                        failover_done = true;
                        continue 'providers;
                    }

                    let message = llm::match_safe_pattern(&message)
                        .map(str::to_string)
                        .unwrap_or_else(|| {
                            log::error!(
                                "stream error (sanitized for client): request_id={} provider={provider_name} \
                                 error={message}",
                                context.request_id
                            );
                            llm::GENERIC_PROVIDER_ERROR.to_string()
                        });

                    let _ = tx.send(StreamChunk::Error { code, message, retryable: false }).await;
                    return;
                }
            }
        }

        // Adapters guarantee a terminal chunk; if the stream ends without
        // one, close out with what we have rather than hanging the caller.
        let _ = tx
            .send(StreamChunk::Complete {
                response_id: None,
                model: params.config.model.clone(),
                provider: provider_name.clone(),
                final_usage: llm::Usage::default(),
            })
            .await;
        return;
    }
}

/// Prepare the fallback provider for a stream restart.
async fn next_stream_provider(
    state: &AppState,
    context: &RequestContext,
    request: &GenerateRequest,
    failed_provider: &str,
) -> Option<(String, GenerateParams, Arc<dyn Provider>)> {
    let (_, tenant_config) = context.require_tenant().ok()?;
    let fallback_name = pick_fallback(tenant_config, request, failed_provider)?.to_string();

    match prepare(state, context, request, Some(&fallback_name)).await {
        Ok(prepared) => Some((prepared.provider_name, prepared.params, prepared.adapter)),
        Err(e) => {
            log::warn!("failed to prepare fallback provider '{fallback_name}': {e}");
            None
        }
    }
}

/// `AiboxService.SelectProvider`: run selection and merging without
/// dispatching, so callers can see which provider and model would serve.
pub(crate) async fn select_provider(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<SelectProviderResponse>, ServiceError> {
    let prepared = prepare(&state, &context, &request, None).await?;

    Ok(Json(SelectProviderResponse {
        provider: prepared.provider_name,
        model: prepared.params.config.model.clone(),
    }))
}
