//! The withdrawal and cancellation rules both escrow contracts enforce.

use crate::{
    ethereum::U256,
    immutables::Immutables,
    timelocks::Stage,
    Secret, Side, Timestamp,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum EscrowState {
    Active,
    Withdrawn,
    Cancelled,
}

/// Where the funds of a settled escrow went.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub recipient: U256,
    pub amount: U256,
    /// The caller collects the safety deposit as reward for settling.
    pub deposit_recipient: U256,
    pub safety_deposit: U256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    pub side: Side,
    pub immutables: Immutables,
    pub state: EscrowState,
}

impl Escrow {
    pub fn new(side: Side, immutables: Immutables) -> Self {
        Escrow {
            side,
            immutables,
            state: EscrowState::Active,
        }
    }

    /// Releases the funds to the counterparty of this side.
    ///
    /// Source funds go to the taker, destination funds to the maker. The
    /// escrow is left untouched on error.
    pub fn withdraw(
        &mut self,
        caller: U256,
        secret: &Secret,
        now: Timestamp,
    ) -> Result<Settlement, EscrowError> {
        if !self.immutables.hashlock.verify(secret) {
            return Err(EscrowError::HashMismatch);
        }
        let stage = self.check_stage(now, Stage::is_withdrawal)?;
        self.check_caller(caller, stage)?;

        let recipient = match self.side {
            Side::Src => self.immutables.taker,
            Side::Dst => self.immutables.maker,
        };
        self.state = EscrowState::Withdrawn;

        Ok(self.settlement(recipient, caller))
    }

    /// Returns the funds to whoever locked them.
    ///
    /// Source funds go back to the maker, destination funds to the taker.
    pub fn cancel(&mut self, caller: U256, now: Timestamp) -> Result<Settlement, EscrowError> {
        let stage = self.check_stage(now, Stage::is_cancellation)?;
        self.check_caller(caller, stage)?;

        let recipient = match self.side {
            Side::Src => self.immutables.maker,
            Side::Dst => self.immutables.taker,
        };
        self.state = EscrowState::Cancelled;

        Ok(self.settlement(recipient, caller))
    }

    pub fn current_stage(&self, now: Timestamp) -> Option<Stage> {
        self.immutables.timelocks.current_stage(self.side, now)
    }

    fn check_stage(
        &self,
        now: Timestamp,
        allowed: impl Fn(Stage) -> bool,
    ) -> Result<Stage, EscrowError> {
        if self.state != EscrowState::Active {
            return Err(EscrowError::AlreadySettled(self.state));
        }

        match self.current_stage(now) {
            Some(stage) if allowed(stage) => Ok(stage),
            current => Err(EscrowError::StageNotActive {
                side: self.side,
                current,
            }),
        }
    }

    fn check_caller(&self, caller: U256, stage: Stage) -> Result<(), EscrowError> {
        if !stage.is_public() && caller != self.immutables.taker {
            return Err(EscrowError::Unauthorized { stage });
        }

        Ok(())
    }

    fn settlement(&self, recipient: U256, caller: U256) -> Settlement {
        Settlement {
            recipient,
            amount: self.immutables.amount,
            deposit_recipient: caller,
            safety_deposit: self.immutables.safety_deposit,
        }
    }
}

#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
pub enum EscrowError {
    #[error("secret does not hash to the escrow's hashlock")]
    HashMismatch,
    #[error("escrow is already {0}")]
    AlreadySettled(EscrowState),
    #[error("requested transition is not open on the {side} escrow, current stage is {current:?}")]
    StageNotActive { side: Side, current: Option<Stage> },
    #[error("only the taker may act during {stage}")]
    Unauthorized { stage: Stage },
}
