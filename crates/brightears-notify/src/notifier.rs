//! Retrying, circuit-broken notification sender.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use brightears_core::{Environment, TimePoint};
use tracing::{debug, info, warn};

use crate::{
    breaker::{BreakerConfig, BreakerState, CircuitBreaker},
    error::NotifyError,
    provider::{Channel, Notification, NotificationProvider, Receipt},
    retry::RetryPolicy,
};

struct Route<I> {
    provider: Arc<dyn NotificationProvider>,
    breaker: Mutex<CircuitBreaker<I>>,
}

impl<I: TimePoint> Route<I> {
    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker<I>> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, now: I) -> Result<Permit<'_, I>, std::time::Duration> {
        self.breaker().try_acquire(now)?;
        Ok(Permit { route: self, settled: false })
    }
}

/// A call admitted by the breaker.
///
/// Dropping it without a verdict, as happens when the sending future is
/// cancelled mid-call, abandons the call so a half-open breaker does not
/// wait forever for a trial that will never report back.
struct Permit<'a, I: TimePoint> {
    route: &'a Route<I>,
    settled: bool,
}

impl<I: TimePoint> Permit<'_, I> {
    fn succeed(mut self) {
        self.settled = true;
        self.route.breaker().record_success();
    }

    fn fail(mut self, now: I) {
        self.settled = true;
        self.route.breaker().record_failure(now);
    }
}

impl<I: TimePoint> Drop for Permit<'_, I> {
    fn drop(&mut self) {
        if !self.settled {
            self.route.breaker().abandon();
        }
    }
}

/// Sends notifications through per-channel providers.
///
/// Each channel has its own [`CircuitBreaker`]: an email outage does not
/// stop SMS. Transient failures are retried per [`RetryPolicy`]; permanent
/// failures and open breakers return immediately.
pub struct Notifier<E: Environment> {
    env: E,
    retry: RetryPolicy,
    breaker_config: BreakerConfig,
    routes: HashMap<Channel, Route<E::Instant>>,
}

impl<E: Environment> Notifier<E> {
    /// Notifier with no providers registered.
    pub fn new(env: E, retry: RetryPolicy, breaker_config: BreakerConfig) -> Self {
        Self { env, retry, breaker_config, routes: HashMap::new() }
    }

    /// Register the provider for `channel`, replacing any previous one and
    /// starting with a closed breaker.
    #[must_use]
    pub fn with_provider(mut self, channel: Channel, provider: Arc<dyn NotificationProvider>) -> Self {
        let breaker = Mutex::new(CircuitBreaker::new(self.breaker_config.clone()));
        self.routes.insert(channel, Route { provider, breaker });
        self
    }

    /// Breaker state for `channel`, if a provider is registered.
    pub fn breaker_state(&self, channel: Channel) -> Option<BreakerState> {
        self.routes.get(&channel).map(|route| route.breaker().state())
    }

    /// Close every breaker.
    pub fn reset(&self) {
        for (channel, route) in &self.routes {
            route.breaker().reset();
            debug!(%channel, "breaker reset");
        }
    }

    /// Deliver `notification`, retrying transient failures.
    pub async fn send(&self, notification: &Notification) -> Result<Receipt, NotifyError> {
        let channel = notification.channel;
        let route = self.routes.get(&channel).ok_or(NotifyError::NoProvider(channel))?;
        let attempts = self.retry.attempts();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let permit = route
                .acquire(self.env.now())
                .map_err(|retry_in| NotifyError::CircuitOpen { channel, retry_in })?;

            let outcome = route.provider.deliver(notification).await;
            let error = match outcome {
                Ok(receipt) => {
                    permit.succeed();
                    info!(%channel, provider = route.provider.name(), attempt, "notification delivered");
                    return Ok(receipt);
                },
                Err(error) => error,
            };
            permit.fail(self.env.now());

            if !error.transient {
                warn!(%channel, error = %error, "notification rejected");
                return Err(NotifyError::Provider { channel, source: error });
            }
            if attempt >= attempts {
                warn!(%channel, attempts, error = %error, "notification retries exhausted");
                return Err(NotifyError::Exhausted { channel, attempts, last: error });
            }

            let delay = self.retry.delay_after(attempt);
            debug!(%channel, attempt, ?delay, error = %error, "retrying notification");
            self.env.sleep(delay).await;
        }
    }
}
