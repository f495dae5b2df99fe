//! Task submission: pre-charge, upstream call, persistence and settlement.

use mockable::Clock;

use super::RelayPorts;
use crate::billing::{
    PreCharge, QuotaBreakdown, QuotaPolicy, SettlementContext, SettlementResult,
    custom_pass_quota, precharge_quota, settle,
};
use crate::relay::http::preview_body;
use crate::relay::{
    ClientReply, FetchErrorKind, InboundRequest, RelayContext, SubmitOutcome, TaskAdaptor,
    UpstreamRequest, UpstreamResponse,
};
use crate::task::domain::{
    ExternalTaskId, NewTask, Platform, Task, TaskError, TaskErrorKind, TaskProperties,
    TaskRecordId,
};
use crate::task::ports::{ConsumeContext, QuotaLedger, TaskStore};

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReceipt {
    /// Upstream identifier; empty for non-submission pass-through calls.
    pub task_id: ExternalTaskId,
    /// Identifier of the persisted task.
    pub record_id: TaskRecordId,
    /// Reply for the caller.
    pub reply: ClientReply,
    /// Estimate checked against the balance before the call.
    pub pre_charge: i64,
    /// Quota stored on the task and refunded if it fails.
    pub task_quota: i64,
    /// Posted charge, absent when the ledger rejected it.
    pub settlement: Option<SettlementResult>,
}

/// Orchestrates one asynchronous task submission.
pub struct TaskSubmitService<S, L, C>
where
    S: TaskStore,
    L: QuotaLedger,
    C: Clock + Send + Sync,
{
    ports: RelayPorts<S, L, C>,
    policy: QuotaPolicy,
}

/// Pricing facts fixed before the upstream is called.
struct Quote {
    model_name: String,
    group_ratio: f64,
    estimate: PreCharge,
    balance: i64,
}

impl<S, L, C> TaskSubmitService<S, L, C>
where
    S: TaskStore,
    L: QuotaLedger,
    C: Clock + Send + Sync,
{
    /// Creates a submission service.
    #[must_use]
    pub const fn new(ports: RelayPorts<S, L, C>, policy: QuotaPolicy) -> Self {
        Self { ports, policy }
    }

    /// Submits a task to the upstream chosen by `context.platform`.
    ///
    /// Once the upstream accepts, the charge is settled even if the task
    /// cannot be persisted.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] carrying a stable code and HTTP-equivalent
    /// status for every rejected or failed submission.
    pub async fn submit(
        &self,
        mut context: RelayContext,
        request: InboundRequest,
    ) -> Result<SubmitReceipt, TaskError> {
        let adaptor = self.ports.registry.get(context.platform).ok_or_else(|| {
            TaskError::local(
                TaskErrorKind::InvalidApiPlatform,
                format!("invalid api platform: {}", context.platform),
            )
        })?;
        adaptor.init(&mut context);
        adaptor.validate_request_and_set_action(&mut context, &request)?;

        let quote = self.quote(adaptor.as_ref(), &context).await?;
        if let Some(origin) = context.origin_task_id.clone() {
            self.reroute(&mut context, &origin).await?;
        }

        let response = self.exchange(adaptor.as_ref(), &context).await?;
        let outcome = adaptor.do_response(&context, &response)?;

        let breakdown = if context.platform == Platform::CustomPass {
            custom_pass_quota(
                self.ports.pricing.as_ref(),
                &self.policy,
                &quote.model_name,
                quote.group_ratio,
                outcome.usage.as_ref(),
            )
        } else {
            QuotaBreakdown::fixed(quote.model_name.as_str(), &quote.estimate)
        };
        let task_quota = breakdown.quota;
        let persisted = self.persist(&context, &outcome, task_quota).await;
        let settlement = self.settle(&context, &quote, breakdown).await;
        let record_id = persisted?;

        tracing::info!(
            target: "taskrelay::submit",
            platform = context.platform.as_str(),
            action = %context.action,
            task_id = %outcome.task_id,
            record_id = %record_id,
            quota = task_quota,
            "task submitted"
        );
        Ok(SubmitReceipt {
            task_id: outcome.task_id,
            record_id,
            reply: outcome.client_body,
            pre_charge: quote.estimate.quota,
            task_quota,
            settlement,
        })
    }

    async fn quote(
        &self,
        adaptor: &dyn TaskAdaptor,
        context: &RelayContext,
    ) -> Result<Quote, TaskError> {
        let model_name = adaptor.pricing_model(context);
        let group_ratio = self
            .ports
            .pricing
            .effective_group_ratio(&context.user_group, &context.group);
        let estimate = precharge_quota(
            self.ports.pricing.as_ref(),
            &self.policy,
            &model_name,
            group_ratio,
        );
        let balance = self
            .ports
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
        Ok(Quote {
            model_name,
            group_ratio,
            estimate,
            balance,
        })
    }

    /// Binds the submission to the channel that ran the origin task.
    async fn reroute(
        &self,
        context: &mut RelayContext,
        origin: &ExternalTaskId,
    ) -> Result<(), TaskError> {
        let origin_task = self
            .ports
            .store
            .get_by_task_id(context.user_id, origin)
            .await
            .map_err(|err| TaskError::wrap(TaskErrorKind::GetOriginTaskFailed, err))?
            .ok_or_else(|| {
                TaskError::local(TaskErrorKind::TaskNotExist, "task_origin_not_exist")
            })?;
        if origin_task.channel_id() == context.channel_id {
            return Ok(());
        }
        let channel = self
            .ports
            .channels
            .get_channel(origin_task.channel_id())
            .await
            .map_err(|err| TaskError::local(TaskErrorKind::ChannelNotFound, err.to_string()))?;
        if !channel.status.is_enabled() {
            return Err(TaskError::local(
                TaskErrorKind::TaskChannelDisable,
                "the channel of the origin task is disabled",
            ));
        }
        tracing::debug!(
            target: "taskrelay::submit",
            origin = %origin,
            from = %context.channel_id,
            to = %channel.id,
            "rerouting to the origin task channel"
        );
        context.base_url = channel.base_url.trim_end_matches('/').to_owned();
        context.api_key = channel.key;
        context.channel_id = origin_task.channel_id();
        Ok(())
    }

    async fn exchange(
        &self,
        adaptor: &dyn TaskAdaptor,
        context: &RelayContext,
    ) -> Result<UpstreamResponse, TaskError> {
        let request = UpstreamRequest {
            method: adaptor.request_method(context),
            url: adaptor.build_request_url(context)?,
            headers: adaptor.build_request_header(context)?,
            body: adaptor.build_request_body(context)?,
        };
        let response = adaptor
            .do_request(&self.ports.client, request)
            .await
            .map_err(|err| {
                let kind = if err.kind() == FetchErrorKind::Body {
                    TaskErrorKind::ReadResponseBodyFailed
                } else {
                    TaskErrorKind::DoRequestFailed
                };
                TaskError::wrap(kind, err)
            })?;
        if !response.is_success() {
            return Err(
                TaskError::wrap(TaskErrorKind::FailToFetchTask, preview_body(&response.body))
                    .with_status(response.status),
            );
        }
        Ok(response)
    }

    async fn persist(
        &self,
        context: &RelayContext,
        outcome: &SubmitOutcome,
        quota: i64,
    ) -> Result<TaskRecordId, TaskError> {
        let properties = if context.platform == Platform::CustomPass {
            TaskProperties {
                model: context.origin_model_name.clone(),
                input: String::new(),
            }
        } else {
            TaskProperties::default()
        };
        let task = Task::new(
            NewTask {
                platform: context.platform,
                action: context.action.clone(),
                user_id: context.user_id,
                channel_id: context.channel_id,
                token_id: context.token_id,
                token_key: context.token_key.clone(),
                external_id: outcome.task_id.clone(),
                quota,
                data: outcome.data.clone(),
                properties,
            },
            &*self.ports.clock,
        );
        self.ports.store.insert(&task).await.map_err(|err| {
            tracing::error!(
                target: "taskrelay::submit",
                task_id = %outcome.task_id,
                error = %err,
                "failed to persist submitted task"
            );
            TaskError::wrap(TaskErrorKind::InsertTaskFailed, err)
        })
    }

    async fn settle(
        &self,
        context: &RelayContext,
        quote: &Quote,
        breakdown: QuotaBreakdown,
    ) -> Option<SettlementResult> {
        let settlement = SettlementContext {
            consume: ConsumeContext {
                user_id: context.user_id,
                channel_id: context.channel_id,
                token_id: context.token_id,
                token_name: context.token_name.clone(),
                group: context.group.clone(),
            },
            action: context.action.clone(),
            pre_charge: quote.estimate.quota,
            breakdown,
            balance_before: quote.balance,
        };
        match settle(self.ports.ledger.as_ref(), settlement).await {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::error!(
                    target: "taskrelay::submit",
                    user_id = %context.user_id,
                    error = %err,
                    "failed to settle submission charge"
                );
                None
            }
        }
    }
}
