//! Stock reservation across the lines of an order, with compensation.

use std::time::Duration;

use common::{Context, ServiceError};

use crate::model::StockLine;
use crate::services::ProductAuthority;

/// Upper bound for each compensating stock call.
pub const COMPENSATION_TIMEOUT: Duration = Duration::from_secs(5);

/// The lines whose stock decrement has already succeeded in one saga run.
///
/// Lives only for the duration of that run; nothing is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservation {
    lines: Vec<StockLine>,
}

impl Reservation {
    pub fn lines(&self) -> &[StockLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Reserves and releases stock against the product authority, line by line.
///
/// Reservations are issued strictly in input order. If line `k` fails,
/// exactly lines `0..k` are put back before the failure is returned.
/// Compensating calls run on a detached context so that a cancelled
/// request still unwinds what it reserved.
pub struct StockReservationCoordinator<P: ProductAuthority> {
    products: P,
    compensation_timeout: Duration,
}

impl<P: ProductAuthority> StockReservationCoordinator<P> {
    /// Creates a new coordinator.
    pub fn new(products: P) -> Self {
        Self {
            products,
            compensation_timeout: COMPENSATION_TIMEOUT,
        }
    }

    pub fn with_compensation_timeout(mut self, timeout: Duration) -> Self {
        self.compensation_timeout = timeout;
        self
    }

    /// Decrements stock for each line; on the first failure rolls back the
    /// lines that succeeded and returns that failure unchanged.
    #[tracing::instrument(skip(self, ctx, lines), fields(lines = lines.len()))]
    pub async fn reserve(
        &self,
        ctx: &Context,
        lines: &[StockLine],
    ) -> Result<Reservation, ServiceError> {
        let mut reservation = Reservation::default();

        for (index, line) in lines.iter().enumerate() {
            match self
                .products
                .update_stock(ctx, line.product_id, line.reserve_delta())
                .await
            {
                Ok(remaining) => {
                    tracing::debug!(
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        remaining,
                        "stock reserved"
                    );
                    reservation.lines.push(*line);
                }
                Err(err) => {
                    tracing::warn!(
                        index,
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        error = %err,
                        rollback_lines = reservation.lines.len(),
                        "stock reservation failed, rolling back"
                    );
                    if !reservation.is_empty() {
                        metrics::counter!("stock_rollbacks_total").increment(1);
                        self.restore_all(ctx, reservation.lines(), "rollback").await;
                    }
                    return Err(err);
                }
            }
        }

        Ok(reservation)
    }

    /// Puts every line back into stock. Failures are logged, never returned,
    /// and do not stop the remaining lines from being attempted.
    #[tracing::instrument(skip(self, ctx, lines), fields(lines = lines.len()))]
    pub async fn release(&self, ctx: &Context, lines: &[StockLine]) {
        self.restore_all(ctx, lines, "release").await;
    }

    async fn restore_all(&self, ctx: &Context, lines: &[StockLine], reason: &'static str) {
        for line in lines {
            let scope = ctx.detached().with_timeout(self.compensation_timeout);
            if let Err(err) = self
                .products
                .update_stock(&scope, line.product_id, line.release_delta())
                .await
            {
                metrics::counter!("stock_release_failures_total", "reason" => reason)
                    .increment(1);
                tracing::error!(
                    reason,
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    error = %err,
                    "FAILED_TO_RESTORE_STOCK"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{ErrorKind, Money, ProductId};

    use super::*;
    use crate::model::Product;
    use crate::services::InMemoryProductAuthority;

    fn product(id: i64, stock: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            description: String::new(),
            price: Money::from_cents(100),
            stock,
        }
    }

    fn setup() -> (
        StockReservationCoordinator<InMemoryProductAuthority>,
        InMemoryProductAuthority,
    ) {
        let authority = InMemoryProductAuthority::with_products([
            product(1, 10),
            product(2, 10),
            product(3, 1),
            product(4, 10),
        ]);
        (StockReservationCoordinator::new(authority.clone()), authority)
    }

    #[tokio::test]
    async fn test_reserve_all_lines_in_order() {
        let (coordinator, authority) = setup();
        let lines = [StockLine::new(2, 3), StockLine::new(1, 2)];

        let reservation = coordinator.reserve(&Context::new(), &lines).await.unwrap();

        assert_eq!(reservation.lines(), &lines);
        assert_eq!(
            authority.stock_calls(),
            vec![(ProductId::new(2), -3), (ProductId::new(1), -2)]
        );
        assert_eq!(authority.stock_of(ProductId::new(1)), Some(8));
        assert_eq!(authority.stock_of(ProductId::new(2)), Some(7));
    }

    #[tokio::test]
    async fn test_failure_rolls_back_exactly_the_prefix() {
        let (coordinator, authority) = setup();
        let lines = [
            StockLine::new(1, 2),
            StockLine::new(2, 4),
            StockLine::new(3, 5),
            StockLine::new(4, 1),
        ];

        let err = coordinator
            .reserve(&Context::new(), &lines)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            authority.stock_calls(),
            vec![
                (ProductId::new(1), -2),
                (ProductId::new(2), -4),
                (ProductId::new(3), -5),
                (ProductId::new(1), 2),
                (ProductId::new(2), 4),
            ]
        );
        assert_eq!(authority.stock_of(ProductId::new(1)), Some(10));
        assert_eq!(authority.stock_of(ProductId::new(2)), Some(10));
        assert_eq!(authority.stock_of(ProductId::new(3)), Some(1));
        assert_eq!(authority.stock_of(ProductId::new(4)), Some(10));
    }

    #[tokio::test]
    async fn test_first_line_failure_needs_no_rollback() {
        let (coordinator, authority) = setup();
        let err = coordinator
            .reserve(&Context::new(), &[StockLine::new(99, 1), StockLine::new(1, 1)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(authority.stock_calls(), vec![(ProductId::new(99), -1)]);
    }

    #[tokio::test]
    async fn test_release_failure_is_swallowed() {
        let (coordinator, authority) = setup();

        let reservation = coordinator
            .reserve(&Context::new(), &[StockLine::new(1, 1)])
            .await
            .unwrap();
        assert_eq!(reservation.lines().len(), 1);
        authority.set_fail_stock_update(ProductId::new(1), true);

        coordinator.release(&Context::new(), reservation.lines()).await;
        assert_eq!(authority.stock_of(ProductId::new(1)), Some(9));
    }

    #[tokio::test]
    async fn test_release_attempts_every_line() {
        let (coordinator, authority) = setup();
        authority.set_fail_stock_update(ProductId::new(1), true);

        coordinator
            .release(
                &Context::new(),
                &[StockLine::new(1, 1), StockLine::new(2, 2), StockLine::new(4, 3)],
            )
            .await;

        assert_eq!(
            authority.stock_calls(),
            vec![
                (ProductId::new(1), 1),
                (ProductId::new(2), 2),
                (ProductId::new(4), 3),
            ]
        );
        assert_eq!(authority.stock_of(ProductId::new(2)), Some(12));
        assert_eq!(authority.stock_of(ProductId::new(4)), Some(13));
    }

    #[tokio::test]
    async fn test_release_runs_even_when_request_was_cancelled() {
        let (coordinator, authority) = setup();
        let ctx = Context::new();
        ctx.cancel();

        coordinator.release(&ctx, &[StockLine::new(2, 1)]).await;

        assert_eq!(authority.stock_of(ProductId::new(2)), Some(11));
    }
}
