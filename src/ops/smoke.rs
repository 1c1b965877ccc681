//! Post-deploy smoke test: the admin creates a mission and a second
//! account enlists in it.

use anyhow::{ensure, Context, Result};
use tracing::info;

use crate::contracts::MissionControllerClient;
use crate::soroban::keys::Keypair;
use crate::types::{Mission, MissionParams, UserStake};

/// Stake used by the smoke test user (100 KALE).
pub const SMOKE_STAKE: i128 = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct SmokeOutcome {
    pub mission: Mission,
    pub stake: UserStake,
    pub enlist_hash: String,
}

pub async fn run_smoke(
    controller: &MissionControllerClient,
    admin: &Keypair,
    user: &Keypair,
    params: &MissionParams,
    stake: i128,
) -> Result<SmokeOutcome> {
    info!(admin = %admin.public_key(), "Creating smoke-test mission");
    let mission_id = controller
        .create_mission(admin, params)
        .await
        .context("create_mission as admin")?;
    info!(mission_id, "Mission created");

    info!(user = %user.public_key(), mission_id, stake = %stake, "Enlisting smoke-test user");
    let receipt = controller
        .enlist(user, mission_id, stake)
        .await
        .context("enlist as user")?;

    let mission = controller.get_mission(mission_id).await?;
    let user_stake = controller
        .get_user_stake(&user.public_key(), mission_id)
        .await?;

    ensure!(
        mission.participants_count >= 1,
        "mission {mission_id} reports no participants after enlisting"
    );
    ensure!(
        user_stake.kale_staked == stake,
        "stake recorded as {} instead of {stake}",
        user_stake.kale_staked
    );
    info!(%mission, hash = %receipt.hash, "Smoke test passed");

    Ok(SmokeOutcome {
        mission,
        stake: user_stake,
        enlist_hash: receipt.hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{InvokeReceipt, MockContractInvoker};
    use crate::soroban::scval;
    use std::sync::Arc;
    use stellar_xdr::curr::ScVal;

    const CONTROLLER: &str = "CAYN6HSE7E6MH2PYKQ6VPRLOUUQVX735UUMM45Y76IJETJUWU6K67IOA";

    fn params() -> MissionParams {
        MissionParams {
            target_liquidity: 100_000_000_000,
            reward_pool: 50_000_000_000,
            duration_hours: 24,
            trigger_price: 1_000_000,
        }
    }

    fn mission_val(participants: u32) -> ScVal {
        scval::record(vec![
            ("id", scval::u64(1)),
            ("target_liquidity", scval::i128(100_000_000_000)),
            ("current_progress", scval::i128(0)),
            ("reward_pool", scval::i128(50_000_000_000)),
            ("deadline", scval::u64(1_800_000_000)),
            ("active", ScVal::Bool(true)),
            ("trigger_price", scval::i128(1_000_000)),
            ("participants_count", scval::u32(participants)),
        ])
        .unwrap()
    }

    fn chain(user: String, staked: i128, participants: u32) -> MockContractInvoker {
        let mut mock = MockContractInvoker::new();
        mock.expect_invoke().returning(|call, _| {
            let return_value = match call.function.as_str() {
                "create_mission" => Some(ScVal::U64(1)),
                _ => None,
            };
            Ok(InvokeReceipt {
                hash: format!("{}-hash", call.function),
                ledger: Some(10),
                return_value,
            })
        });
        mock.expect_simulate().returning(move |call| match call.function.as_str() {
            "get_mission" => Ok(mission_val(participants)),
            "get_user_stake" => Ok(scval::record(vec![
                ("user", scval::address(&user).unwrap()),
                ("mission_id", scval::u64(1)),
                ("kale_staked", scval::i128(staked)),
                ("contribution", scval::i128(0)),
                ("enlisted_at", scval::u64(1_700_000_000)),
            ])
            .unwrap()),
            other => panic!("unexpected read {other}"),
        });
        mock
    }

    #[tokio::test]
    async fn test_smoke_passes() {
        let (admin, user) = (Keypair::random(), Keypair::random());
        let controller = MissionControllerClient::new(
            Arc::new(chain(user.public_key(), SMOKE_STAKE, 1)),
            CONTROLLER,
        );
        let out = run_smoke(&controller, &admin, &user, &params(), SMOKE_STAKE)
            .await
            .unwrap();
        assert_eq!(out.mission.id, 1);
        assert_eq!(out.stake.kale_staked, SMOKE_STAKE);
        assert_eq!(out.enlist_hash, "enlist-hash");
    }

    #[tokio::test]
    async fn test_smoke_detects_missing_stake() {
        let (admin, user) = (Keypair::random(), Keypair::random());
        let controller =
            MissionControllerClient::new(Arc::new(chain(user.public_key(), 0, 1)), CONTROLLER);
        let err = run_smoke(&controller, &admin, &user, &params(), SMOKE_STAKE)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stake recorded"));
    }
}
