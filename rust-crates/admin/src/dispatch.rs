use crate::{
    api::AdminApi,
    error::ConsoleError,
    model::TelegramId,
    selection::IdSet,
};
use std::fmt;

/// A positive number of diamonds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(u64);

impl Amount {
    /// Parses operator input. Anything that is not a whole number above zero is
    /// rejected before it can reach the API.
    pub fn parse(input: &str) -> Result<Self, ConsoleError> {
        let invalid = || ConsoleError::InvalidAmount {
            input: input.to_string(),
        };
        let value: i128 = input.trim().parse().map_err(|_| invalid())?;
        Self::try_from(value).map_err(|_| invalid())
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<i128> for Amount {
    type Error = ConsoleError;

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        match u64::try_from(value) {
            Ok(amount) if amount > 0 => Ok(Self(amount)),
            _ => Err(ConsoleError::InvalidAmount {
                input: value.to_string(),
            }),
        }
    }
}

impl TryFrom<i64> for Amount {
    type Error = ConsoleError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::try_from(i128::from(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One diamond grant, frozen at the moment the operator confirmed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchRequest {
    targets: Vec<TelegramId>,
    amount: Amount,
}

impl BatchRequest {
    /// Selection is checked before the amount.
    pub fn new(targets: &IdSet, amount_input: &str) -> Result<Self, ConsoleError> {
        if targets.is_empty() {
            return Err(ConsoleError::NoSelection);
        }
        let amount = Amount::parse(amount_input)?;
        Ok(Self {
            targets: targets.iter().cloned().collect(),
            amount,
        })
    }

    pub fn targets(&self) -> &[TelegramId] {
        &self.targets
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReceipt {
    pub players: usize,
    pub amount: Amount,
}

/// Validates, then sends exactly one grant request. Never retries.
pub async fn dispatch<A: AdminApi>(
    api: &A,
    targets: &IdSet,
    amount_input: &str,
) -> Result<BatchReceipt, ConsoleError> {
    let request = BatchRequest::new(targets, amount_input)?;
    send(api, request).await
}

/// Sends an already validated request once.
pub async fn send<A: AdminApi>(
    api: &A,
    request: BatchRequest,
) -> Result<BatchReceipt, ConsoleError> {
    tracing::info!(
        players = request.targets().len(),
        amount = request.amount().get(),
        "dispatching diamond grant"
    );
    match api.grant_diamonds(&request).await {
        Ok(()) => Ok(BatchReceipt {
            players: request.targets().len(),
            amount: request.amount(),
        }),
        Err(err) => {
            tracing::error!(error = %err, "diamond grant failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        catalog::ShopCatalog,
        model::PlayerRecord,
    };
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    #[derive(Default)]
    struct CountingApi {
        grants: AtomicUsize,
    }

    impl AdminApi for CountingApi {
        async fn list_users(&self) -> Result<Vec<PlayerRecord>, ConsoleError> {
            Ok(Vec::new())
        }

        async fn grant_diamonds(&self, _request: &BatchRequest) -> Result<(), ConsoleError> {
            self.grants.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_catalog(&self) -> Result<ShopCatalog, ConsoleError> {
            Ok(ShopCatalog::default())
        }

        async fn save_catalog(&self, _catalog: &ShopCatalog) -> Result<(), ConsoleError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatch__rejected_input_never_reaches_the_api() {
        // given
        let api = CountingApi::default();
        let targets: IdSet = [TelegramId::new("u1")].into_iter().collect();

        // when
        let empty = dispatch(&api, &IdSet::new(), "5").await;
        let bad_amount = dispatch(&api, &targets, "abc").await;
        let sent = dispatch(&api, &targets, "5").await;

        // then
        assert_eq!(empty, Err(ConsoleError::NoSelection));
        assert!(matches!(bad_amount, Err(ConsoleError::InvalidAmount { .. })));
        assert_eq!(
            sent.map(|receipt| receipt.players),
            Ok(1)
        );
        assert_eq!(api.grants.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn amount__accepts_positive_integers_with_whitespace() {
        assert_eq!(Amount::parse(" 25 ").map(Amount::get), Ok(25));
    }

    #[test]
    fn amount__rejects_zero_negative_and_text() {
        for input in ["0", "-3", "abc", "", "1.5", "99999999999999999999999"] {
            assert_eq!(
                Amount::parse(input),
                Err(ConsoleError::InvalidAmount {
                    input: input.to_string()
                }),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn amount__try_from_negative_integer_is_invalid() {
        assert!(matches!(
            Amount::try_from(-3i64),
            Err(ConsoleError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn batch_request__empty_targets_win_over_bad_amount() {
        // given
        let targets = IdSet::new();

        // when
        let result = BatchRequest::new(&targets, "abc");

        // then
        assert_eq!(result, Err(ConsoleError::NoSelection));
    }
}
