//! Synchronous pass-through relay billed on the spot.

use std::sync::Arc;

use reqwest::{Method, Url};

use crate::billing::{
    QuotaPolicy, SettlementContext, SettlementResult, custom_pass_quota, precharge_quota, settle,
};
use crate::relay::adaptor::build_failed;
use crate::relay::custompass::wire::extract_usage;
use crate::relay::{
    ClientReply, CustomPassAdaptor, FetchErrorKind, InboundRequest, RelayContext, UpstreamClient,
    UpstreamRequest, Usage,
};
use crate::task::domain::{TaskError, TaskErrorKind};
use crate::task::ports::{ConsumeContext, PricingResolver, QuotaLedger};

/// Result of a relayed synchronous call.
#[derive(Debug, Clone, PartialEq)]
pub struct PassThroughReceipt {
    /// Upstream response, unchanged.
    pub reply: ClientReply,
    /// Usage reported by the upstream, if any.
    pub usage: Option<Usage>,
    /// Posted charge; `None` for non-2xx replies or when the ledger failed.
    pub settlement: Option<SettlementResult>,
}

/// Forwards arbitrary `model/action` calls to pass-through channels.
pub struct PassThroughService<L>
where
    L: QuotaLedger,
{
    ledger: Arc<L>,
    pricing: Arc<dyn PricingResolver>,
    client: UpstreamClient,
    adaptor: CustomPassAdaptor,
    policy: QuotaPolicy,
}

impl<L> PassThroughService<L>
where
    L: QuotaLedger,
{
    /// Creates the relay.
    #[must_use]
    pub const fn new(
        ledger: Arc<L>,
        pricing: Arc<dyn PricingResolver>,
        client: UpstreamClient,
        adaptor: CustomPassAdaptor,
        policy: QuotaPolicy,
    ) -> Self {
        Self {
            ledger,
            pricing,
            client,
            adaptor,
            policy,
        }
    }

    /// Relays one call to `{base_url}/{origin_model_name}`.
    ///
    /// GET query parameters are forwarded on the URL; other methods forward
    /// the body unchanged. Non-2xx replies are returned without billing.
    ///
    /// # Errors
    ///
    /// Returns `quota_not_enough` when the balance cannot cover the estimate,
    /// `build_request_failed` for unroutable contexts and `do_request_failed`
    /// for transport failures.
    pub async fn relay(
        &self,
        context: &RelayContext,
        request: InboundRequest,
    ) -> Result<PassThroughReceipt, TaskError> {
        let model = context.origin_model_name.as_str();
        let group_ratio = self
            .pricing
            .effective_group_ratio(&context.user_group, &context.group);
        let estimate = precharge_quota(self.pricing.as_ref(), &self.policy, model, group_ratio);
        let balance = self
            .ledger
            .get_balance(context.user_id)
            .await
            .map_err(|err| TaskError::wrap(TaskErrorKind::GetUserQuotaFailed, err))?;
        if balance.saturating_sub(estimate.quota) < 0 {
            return Err(TaskError::local(
                TaskErrorKind::QuotaNotEnough,
                "user quota is not enough",
            ));
        }

        let upstream = self.build_request(context, request)?;
        let response = self.client.submit(upstream).await.map_err(|err| {
            let kind = if err.kind() == FetchErrorKind::Body {
                TaskErrorKind::ReadResponseBodyFailed
            } else {
                TaskErrorKind::DoRequestFailed
            };
            TaskError::wrap(kind, err)
        })?;
        let reply = ClientReply::passthrough(&response);
        if !response.is_success() {
            tracing::warn!(
                target: "taskrelay::adaptor",
                stage = "custompass.sync",
                model,
                status = response.status,
                "pass-through call rejected upstream"
            );
            return Ok(PassThroughReceipt {
                reply,
                usage: None,
                settlement: None,
            });
        }

        let usage = extract_usage(&response.body);
        let breakdown = custom_pass_quota(
            self.pricing.as_ref(),
            &self.policy,
            model,
            group_ratio,
            usage.as_ref(),
        );
        let settlement = SettlementContext {
            consume: ConsumeContext {
                user_id: context.user_id,
                channel_id: context.channel_id,
                token_id: context.token_id,
                token_name: context.token_name.clone(),
                group: context.group.clone(),
            },
            action: context.action.clone(),
            pre_charge: 0,
            breakdown,
            balance_before: balance,
        };
        let settled = match settle(self.ledger.as_ref(), settlement).await {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::error!(
                    target: "taskrelay::billing",
                    user_id = %context.user_id,
                    model,
                    error = %err,
                    "failed to settle pass-through charge"
                );
                None
            }
        };
        Ok(PassThroughReceipt {
            reply,
            usage,
            settlement: settled,
        })
    }

    fn build_request(
        &self,
        context: &RelayContext,
        request: InboundRequest,
    ) -> Result<UpstreamRequest, TaskError> {
        let base = CustomPassAdaptor::model_url(&context.base_url, &context.origin_model_name)?;
        let headers = self
            .adaptor
            .upstream_headers(&context.api_key, Some(context.token_key.as_str()))
            .map_err(build_failed)?;
        let InboundRequest {
            method,
            query,
            body,
        } = request;
        if method == Method::GET {
            let url = if query.is_empty() {
                base
            } else {
                Url::parse_with_params(&base, &query)
                    .map_err(build_failed)?
                    .to_string()
            };
            return Ok(UpstreamRequest {
                method,
                url,
                headers,
                body: None,
            });
        }
        Ok(UpstreamRequest {
            method,
            url: base,
            headers,
            body: (!body.is_empty()).then_some(body),
        })
    }
}
