use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rexagon_market::engine::{PurchaseError, RetryPolicy};
use rexagon_market::model::{MarketItem, TransactionKind, TransactionStatus, User};
use rexagon_market::store::{LedgerStore, MemoryStore};
use rexagon_market::{Amount, Discount, Orchestrator};

#[derive(Debug, Clone)]
enum Op {
    Purchase { user: usize, item: usize },
    Credit { user: usize, minor: i64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..3usize, 0..3usize).prop_map(|(user, item)| Op::Purchase { user, item }),
        1 => (0..3usize, 1..5_000i64).prop_map(|(user, minor)| Op::Credit { user, minor }),
    ]
}

fn setup() -> impl Strategy<Value = (Vec<i64>, Vec<(i64, u32, f64)>)> {
    (
        prop::collection::vec(0..20_000i64, 3),
        prop::collection::vec((0..5_000i64, 0..4u32, 0.0..=100.0f64), 3),
    )
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        attempts: 2,
        backoff: Duration::from_millis(1),
        call_timeout: Duration::from_secs(1),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn credit_and_stock_are_conserved(
        (balances, items) in setup(),
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let orchestrator = Orchestrator::new(store.clone(), policy());

            let mut users = Vec::new();
            for (i, minor) in balances.iter().enumerate() {
                let user = User::new(format!("player{i}"), Amount::from_minor(*minor));
                users.push(user.id);
                store.insert_user(user).await.unwrap();
            }
            let mut catalog = Vec::new();
            for (i, (minor, stock, discount)) in items.iter().enumerate() {
                let discount = Discount::from_percent((discount * 100.0).round() / 100.0).unwrap();
                let item = MarketItem::new(format!("item{i}"), "Paketler", Amount::from_minor(*minor), *stock)
                    .with_discount(discount);
                catalog.push(item.id);
                store.insert_item(item).await.unwrap();
            }

            let mut credited = Amount::ZERO;
            let mut sold: HashMap<usize, u32> = HashMap::new();
            for op in &ops {
                match *op {
                    Op::Purchase { user, item } => {
                        match orchestrator.purchase(users[user], catalog[item]).await {
                            Ok(_) => *sold.entry(item).or_default() += 1,
                            Err(PurchaseError::OutOfStock(_))
                            | Err(PurchaseError::InsufficientCredit { .. }) => {}
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                    Op::Credit { user, minor } => {
                        let amount = Amount::from_minor(minor);
                        orchestrator
                            .wallet()
                            .credit(users[user], amount, TransactionKind::Adjustment)
                            .await
                            .unwrap();
                        credited += amount;
                    }
                }
            }

            // balances stay non-negative and match their ledger
            let mut held = Amount::ZERO;
            for (i, id) in users.iter().enumerate() {
                let balance = store.find_user(*id).await.unwrap().unwrap().credit_balance;
                assert!(!balance.is_negative());
                let ledger: Amount = store
                    .credit_transactions(*id, usize::MAX)
                    .await
                    .unwrap()
                    .into_iter()
                    .filter(|t| t.status == TransactionStatus::Completed)
                    .map(|t| t.amount)
                    .sum();
                assert_eq!(balance, Amount::from_minor(balances[i]) + ledger);
                held += balance;
            }

            // what left the wallets is exactly what the purchase records hold
            let spent: Amount = store
                .recent_purchases(usize::MAX)
                .await
                .unwrap()
                .into_iter()
                .map(|p| p.price_paid)
                .sum();
            let initial: Amount = balances.iter().map(|m| Amount::from_minor(*m)).sum();
            assert_eq!(held + spent, initial + credited);

            // every sold unit left the stock exactly once
            for (i, id) in catalog.iter().enumerate() {
                let stock = store.find_item(*id).await.unwrap().unwrap().stock;
                assert_eq!(stock + sold.get(&i).copied().unwrap_or(0), items[i].1);
            }
        });
    }
}
