// Raffle Registry Program - Master raffle membership and randomness binding
use solana_program::pubkey::Pubkey;

use crate::{
    constants::{MASTER_RAFFLE_DISCRIMINATOR, MAX_MASTER_RAFFLE_INDEXES, RAFFLE_DISCRIMINATOR},
    raffle_error::RaffleError,
    raffle_state::{MasterRaffle, Raffle},
    utils::pack_name,
};

/// Sizing fixed when a raffle is created
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RaffleConfig {
    pub max_tickets_per_holder: u8,
    pub payment_option_count: u8,
    pub reward_count: u8,
    pub max_holder_count: u16,
}

/// Randomness service a master raffle and all of its raffles rely on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RngBinding {
    /// Oracle program id
    pub oracle: Pubkey,
    pub vrf_account: Pubkey,
    pub rng_bot: Pubkey,
}

impl MasterRaffle {
    pub fn new(
        master_raffle: Pubkey,
        name: &str,
        owner: Pubkey,
        max_raffles: u16,
        binding: RngBinding,
    ) -> Result<Self, RaffleError> {
        if max_raffles == 0 {
            return Err(RaffleError::NeedRaffleSlots);
        }
        if max_raffles > MAX_MASTER_RAFFLE_INDEXES {
            return Err(RaffleError::TooManyRaffleSlots);
        }

        Ok(MasterRaffle {
            discriminator: MASTER_RAFFLE_DISCRIMINATOR,
            name: pack_name(name)?,
            master_raffle,
            owner,
            oracle: binding.oracle,
            vrf_account: binding.vrf_account,
            rng_bot: binding.rng_bot,
            max_raffles,
            raffles: Vec::new(),
        })
    }

    pub fn binding(&self) -> RngBinding {
        RngBinding {
            oracle: self.oracle,
            vrf_account: self.vrf_account,
            rng_bot: self.rng_bot,
        }
    }

    pub fn is_member(&self, raffle: &Pubkey) -> bool {
        self.raffles.contains(raffle)
    }

    /// Owner or the bound RNG bot
    pub fn is_rng_authority(&self, signer: &Pubkey) -> bool {
        *signer == self.owner || *signer == self.rng_bot
    }

    /// Build a new raffle record under this master raffle and index it
    pub fn create_raffle(
        &mut self,
        raffle: Pubkey,
        name: &str,
        owner: Pubkey,
        vault: (Pubkey, u8),
        config: RaffleConfig,
    ) -> Result<Raffle, RaffleError> {
        if owner != self.owner {
            return Err(RaffleError::NotMasterOwner);
        }
        if config.payment_option_count == 0 {
            return Err(RaffleError::NeedPaymentOption);
        }
        if config.reward_count == 0 {
            return Err(RaffleError::NeedReward);
        }
        if config.max_holder_count == 0 {
            return Err(RaffleError::NeedHolders);
        }
        if config.max_tickets_per_holder == 0 {
            return Err(RaffleError::NeedTicketsPerHolder);
        }
        let name = pack_name(name)?;
        self.add_raffle(raffle)?;

        Ok(Raffle {
            discriminator: RAFFLE_DISCRIMINATOR,
            name,
            master_raffle: self.master_raffle,
            raffle,
            owner,
            vault: vault.0,
            rng_bot: self.rng_bot,
            nonce: vault.1,
            max_tickets_per_holder: config.max_tickets_per_holder,
            payment_option_count: config.payment_option_count,
            reward_count: config.reward_count,
            max_holder_count: config.max_holder_count,
            start_date: 0,
            end_date: 0,
            payment_options: Vec::new(),
            rewards: Vec::new(),
            holders: Vec::new(),
        })
    }

    pub fn add_raffle(&mut self, raffle: Pubkey) -> Result<(), RaffleError> {
        if self.raffles.len() >= self.max_raffles as usize {
            return Err(RaffleError::MasterRaffleFull);
        }
        if self.is_member(&raffle) {
            return Err(RaffleError::RaffleStillMember);
        }
        self.raffles.push(raffle);
        Ok(())
    }

    /// Drop a settled raffle from the index, keeping the order of the others
    pub fn remove_raffle(&mut self, raffle: &Raffle) -> Result<(), RaffleError> {
        if raffle.master_raffle != self.master_raffle {
            return Err(RaffleError::RaffleNotMember);
        }
        let position = self
            .raffles
            .iter()
            .position(|key| *key == raffle.raffle)
            .ok_or(RaffleError::RaffleNotMember)?;
        if !raffle.is_cleared() {
            return Err(RaffleError::RaffleNotCleared);
        }

        self.raffles.remove(position);
        Ok(())
    }

    pub fn rebind_rng(&mut self, binding: RngBinding) {
        self.oracle = binding.oracle;
        self.vrf_account = binding.vrf_account;
        self.rng_bot = binding.rng_bot;
    }

    /// Bring a member raffle's bot in line with the current binding.
    /// Returns whether the raffle record changed.
    pub fn sync_rng_bot(&self, raffle: &mut Raffle) -> Result<bool, RaffleError> {
        if raffle.master_raffle != self.master_raffle || !self.is_member(&raffle.raffle) {
            return Err(RaffleError::RaffleNotMember);
        }
        if raffle.rng_bot == self.rng_bot {
            return Ok(false);
        }
        raffle.rng_bot = self.rng_bot;
        Ok(true)
    }
}
