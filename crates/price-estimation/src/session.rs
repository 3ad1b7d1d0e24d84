use {
    crate::{
        fence::Fence,
        router::{Quote, QuoteRouter},
    },
    alloy::primitives::{Address, U256},
    std::sync::Arc,
};

/// The request was answered after a newer request of the same session had
/// already been issued.
#[derive(Debug, thiserror::Error)]
#[error("quote request was superseded by a newer request")]
pub struct Superseded;

/// Sequence of quote requests where only the answer to the most recent one
/// matters, e.g. quotes for an amount that is still being typed.
pub struct QuoteSession {
    router: Arc<QuoteRouter>,
    fence: Fence,
}

impl QuoteSession {
    pub fn new(router: Arc<QuoteRouter>) -> Self {
        Self {
            router,
            fence: Fence::new(),
        }
    }

    /// Like [`QuoteRouter::best_quote`] but fails with [`Superseded`] if
    /// another request was issued on this session while this one was in
    /// flight.
    pub async fn best_quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        tick_spacing: Option<i32>,
    ) -> Result<Option<Quote>, Superseded> {
        let ticket = self.fence.issue();
        let quote = self
            .router
            .best_quote(token_in, token_out, amount_in, tick_spacing)
            .await;
        if !self.fence.is_latest(ticket) {
            tracing::debug!(ticket = ticket.get(), "dropping superseded quote");
            return Err(Superseded);
        }
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::router::tests::{FACTORY, QUOTER, single_quote_response},
        async_trait::async_trait,
        ethrpc::{CallRequest, EthCall},
        std::sync::atomic::{AtomicBool, Ordering},
        tokio::sync::Notify,
    };

    /// Holds back the answer to the first call until released.
    struct HeldFirstCall {
        first: AtomicBool,
        release: Notify,
    }

    #[async_trait]
    impl EthCall for HeldFirstCall {
        async fn eth_call(&self, _: CallRequest) -> Result<String, ethrpc::Error> {
            if self.first.swap(false, Ordering::SeqCst) {
                self.release.notified().await;
            }
            Ok(single_quote_response(1_000))
        }

        async fn eth_call_batch(
            &self,
            _: Vec<CallRequest>,
        ) -> Result<Vec<Result<String, ethrpc::Error>>, ethrpc::Error> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn drops_answers_to_superseded_requests() {
        let eth = Arc::new(HeldFirstCall {
            first: AtomicBool::new(true),
            release: Notify::new(),
        });
        let router = QuoteRouter::new(eth.clone(), QUOTER, FACTORY, vec![50]);
        let session = QuoteSession::new(Arc::new(router));
        let token_in = Address::repeat_byte(0xa0);
        let token_out = Address::repeat_byte(0xb0);

        let (first, second) = tokio::join!(
            session.best_quote(token_in, token_out, U256::from(1), None),
            async {
                let quote = session
                    .best_quote(token_in, token_out, U256::from(2), None)
                    .await;
                eth.release.notify_one();
                quote
            }
        );

        assert!(matches!(first, Err(Superseded)));
        assert_eq!(second.unwrap().unwrap().amount_out, U256::from(1_000));
    }
}
