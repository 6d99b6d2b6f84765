use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};
use solana_program::{
    program_error::ProgramError,
    program_pack::{IsInitialized, Pack, Sealed},
    pubkey::Pubkey,
};

use crate::constants::{
    MASTER_RAFFLE_DISCRIMINATOR, MAX_NAME_LENGTH, RAFFLE_DISCRIMINATOR, RNG_STATE_DISCRIMINATOR,
};
use crate::utils::unpack_name;

fn unpack_bool(src: &[u8; 1]) -> Result<bool, ProgramError> {
    match src[0] {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(ProgramError::InvalidAccountData),
    }
}

fn unpack_optional_key(src: &[u8; 32]) -> Option<Pubkey> {
    let key = Pubkey::new_from_array(*src);
    if key == Pubkey::default() {
        None
    } else {
        Some(key)
    }
}

/// One way of buying tickets: `price` of `payment_mint` grants `tickets_per_payment` tickets
#[derive(Clone, Debug, PartialEq)]
pub struct RafflePaymentOption {
    /// Human readable name, zero padded
    pub name: [u8; MAX_NAME_LENGTH],
    /// Mint of the token paid for tickets
    pub payment_mint: Pubkey,
    /// Price of one purchase unit
    pub price: u64,
    /// Tickets granted per purchase unit
    pub tickets_per_payment: u8,
    /// Total paid through this option, never decreases
    pub payment_tally: u64,
    /// Set once the tally has been moved out of the vault
    pub cashed_out: bool,
}

impl RafflePaymentOption {
    pub fn name(&self) -> String {
        unpack_name(&self.name)
    }

    /// Purchase units recorded so far
    pub fn units_sold(&self) -> u64 {
        if self.price == 0 {
            0
        } else {
            self.payment_tally / self.price
        }
    }
}

/// A prize held in the vault until its winner redeems it
#[derive(Clone, Debug, PartialEq)]
pub struct RaffleReward {
    /// Human readable name, zero padded
    pub name: [u8; MAX_NAME_LENGTH],
    /// Mint of the rewarded token
    pub reward_mint: Pubkey,
    /// Rewards sharing a non-zero group id are won together
    pub group_id: Pubkey,
    /// Unset until winners are picked
    pub winner: Option<Pubkey>,
    /// Amount moved to the winner on redemption
    pub reward_amount: u64,
    pub redeemed: bool,
}

impl RaffleReward {
    pub fn name(&self) -> String {
        unpack_name(&self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TicketHolder {
    pub holder: Pubkey,
    pub tickets: u8,
}

impl Sealed for RafflePaymentOption {}
impl Sealed for RaffleReward {}
impl Sealed for TicketHolder {}

impl Pack for RafflePaymentOption {
    const LEN: usize = 64 + 32 + 8 + 1 + 8 + 1;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, RafflePaymentOption::LEN];
        let (name, payment_mint, price, tickets_per_payment, payment_tally, cashed_out) =
            array_refs![src, 64, 32, 8, 1, 8, 1];

        Ok(RafflePaymentOption {
            name: *name,
            payment_mint: Pubkey::new_from_array(*payment_mint),
            price: u64::from_le_bytes(*price),
            tickets_per_payment: tickets_per_payment[0],
            payment_tally: u64::from_le_bytes(*payment_tally),
            cashed_out: unpack_bool(cashed_out)?,
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, RafflePaymentOption::LEN];
        let (name_dst, mint_dst, price_dst, tickets_dst, tally_dst, cashed_out_dst) =
            mut_array_refs![dst, 64, 32, 8, 1, 8, 1];

        name_dst.copy_from_slice(&self.name);
        mint_dst.copy_from_slice(self.payment_mint.as_ref());
        *price_dst = self.price.to_le_bytes();
        tickets_dst[0] = self.tickets_per_payment;
        *tally_dst = self.payment_tally.to_le_bytes();
        cashed_out_dst[0] = self.cashed_out as u8;
    }
}

impl Pack for RaffleReward {
    const LEN: usize = 64 + 32 * 3 + 8 + 1;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, RaffleReward::LEN];
        let (name, reward_mint, group_id, winner, reward_amount, redeemed) =
            array_refs![src, 64, 32, 32, 32, 8, 1];

        Ok(RaffleReward {
            name: *name,
            reward_mint: Pubkey::new_from_array(*reward_mint),
            group_id: Pubkey::new_from_array(*group_id),
            winner: unpack_optional_key(winner),
            reward_amount: u64::from_le_bytes(*reward_amount),
            redeemed: unpack_bool(redeemed)?,
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, RaffleReward::LEN];
        let (name_dst, mint_dst, group_dst, winner_dst, amount_dst, redeemed_dst) =
            mut_array_refs![dst, 64, 32, 32, 32, 8, 1];

        name_dst.copy_from_slice(&self.name);
        mint_dst.copy_from_slice(self.reward_mint.as_ref());
        group_dst.copy_from_slice(self.group_id.as_ref());
        winner_dst.copy_from_slice(self.winner.unwrap_or_default().as_ref());
        *amount_dst = self.reward_amount.to_le_bytes();
        redeemed_dst[0] = self.redeemed as u8;
    }
}

impl Pack for TicketHolder {
    const LEN: usize = 32 + 1;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, TicketHolder::LEN];
        let (holder, tickets) = array_refs![src, 32, 1];

        Ok(TicketHolder {
            holder: Pubkey::new_from_array(*holder),
            tickets: tickets[0],
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, TicketHolder::LEN];
        let (holder_dst, tickets_dst) = mut_array_refs![dst, 32, 1];

        holder_dst.copy_from_slice(self.holder.as_ref());
        tickets_dst[0] = self.tickets;
    }
}

/// Operator level registry: the raffles it indexes and the randomness binding they share
#[derive(Clone, Debug, PartialEq)]
pub struct MasterRaffle {
    pub discriminator: [u8; 8],
    pub name: [u8; MAX_NAME_LENGTH],
    /// Self pointer
    pub master_raffle: Pubkey,
    pub owner: Pubkey,
    /// Program id of the oracle service that fulfills randomness
    pub oracle: Pubkey,
    /// VRF binding account owned by the oracle
    pub vrf_account: Pubkey,
    /// Identity allowed to request randomness and pick winners
    pub rng_bot: Pubkey,
    /// Number of raffle slots allocated at creation
    pub max_raffles: u16,
    /// Member raffles, in insertion order
    pub raffles: Vec<Pubkey>,
}

impl MasterRaffle {
    pub const BASE_LEN: usize = 8 + 64 + 32 * 5 + 2 + 4;

    /// Account size needed for `max_raffles` slots
    pub fn space(max_raffles: u16) -> usize {
        Self::BASE_LEN + 32 * max_raffles as usize
    }

    pub fn name(&self) -> String {
        unpack_name(&self.name)
    }

    pub fn unpack(src: &[u8]) -> Result<Self, ProgramError> {
        if src.len() < Self::BASE_LEN {
            return Err(ProgramError::InvalidAccountData);
        }
        let base = array_ref![src, 0, MasterRaffle::BASE_LEN];
        let (
            discriminator,
            name,
            master_raffle,
            owner,
            oracle,
            vrf_account,
            rng_bot,
            max_raffles,
            raffle_count,
        ) = array_refs![base, 8, 64, 32, 32, 32, 32, 32, 2, 4];

        if *discriminator != MASTER_RAFFLE_DISCRIMINATOR {
            return Err(ProgramError::UninitializedAccount);
        }

        let max_raffles = u16::from_le_bytes(*max_raffles);
        let raffle_count = u32::from_le_bytes(*raffle_count) as usize;
        if raffle_count > max_raffles as usize || src.len() < Self::space(max_raffles) {
            return Err(ProgramError::InvalidAccountData);
        }

        let raffles = (0..raffle_count)
            .map(|i| Pubkey::new_from_array(*array_ref![src, Self::BASE_LEN + 32 * i, 32]))
            .collect();

        Ok(MasterRaffle {
            discriminator: *discriminator,
            name: *name,
            master_raffle: Pubkey::new_from_array(*master_raffle),
            owner: Pubkey::new_from_array(*owner),
            oracle: Pubkey::new_from_array(*oracle),
            vrf_account: Pubkey::new_from_array(*vrf_account),
            rng_bot: Pubkey::new_from_array(*rng_bot),
            max_raffles,
            raffles,
        })
    }

    pub fn pack(&self, dst: &mut [u8]) -> Result<(), ProgramError> {
        if dst.len() < Self::space(self.max_raffles) || self.raffles.len() > self.max_raffles as usize
        {
            return Err(ProgramError::AccountDataTooSmall);
        }
        let base = array_mut_ref![dst, 0, MasterRaffle::BASE_LEN];
        let (
            discriminator_dst,
            name_dst,
            master_raffle_dst,
            owner_dst,
            oracle_dst,
            vrf_account_dst,
            rng_bot_dst,
            max_raffles_dst,
            raffle_count_dst,
        ) = mut_array_refs![base, 8, 64, 32, 32, 32, 32, 32, 2, 4];

        *discriminator_dst = self.discriminator;
        name_dst.copy_from_slice(&self.name);
        master_raffle_dst.copy_from_slice(self.master_raffle.as_ref());
        owner_dst.copy_from_slice(self.owner.as_ref());
        oracle_dst.copy_from_slice(self.oracle.as_ref());
        vrf_account_dst.copy_from_slice(self.vrf_account.as_ref());
        rng_bot_dst.copy_from_slice(self.rng_bot.as_ref());
        *max_raffles_dst = self.max_raffles.to_le_bytes();
        *raffle_count_dst = (self.raffles.len() as u32).to_le_bytes();

        for slot in 0..self.max_raffles as usize {
            let key = self.raffles.get(slot).copied().unwrap_or_default();
            array_mut_ref![dst, Self::BASE_LEN + 32 * slot, 32].copy_from_slice(key.as_ref());
        }
        Ok(())
    }
}

impl IsInitialized for MasterRaffle {
    fn is_initialized(&self) -> bool {
        self.discriminator == MASTER_RAFFLE_DISCRIMINATOR
    }
}

/// Per raffle record: configuration, payment options, rewards and the ticket holder table
#[derive(Clone, Debug, PartialEq)]
pub struct Raffle {
    pub discriminator: [u8; 8],
    pub name: [u8; MAX_NAME_LENGTH],
    /// Parent master raffle
    pub master_raffle: Pubkey,
    /// Self pointer
    pub raffle: Pubkey,
    pub owner: Pubkey,
    /// Escrow vault PDA that owns every token account of this raffle
    pub vault: Pubkey,
    /// RNG bot copied from the master raffle at creation
    pub rng_bot: Pubkey,
    /// Vault derivation nonce
    pub nonce: u8,
    pub max_tickets_per_holder: u8,
    /// Payment options to load before starting
    pub payment_option_count: u8,
    /// Rewards to load before starting
    pub reward_count: u8,
    pub max_holder_count: u16,
    /// Unix time, 0 until started
    pub start_date: u64,
    /// Unix time, 0 until started
    pub end_date: u64,
    pub payment_options: Vec<RafflePaymentOption>,
    pub rewards: Vec<RaffleReward>,
    pub holders: Vec<TicketHolder>,
}

impl Raffle {
    pub const BASE_LEN: usize = 8 + 64 + 32 * 5 + 4 + 2 + 8 * 2 + 4 * 3;

    /// Account size needed for the configured counts
    pub fn space(payment_option_count: u8, reward_count: u8, max_holder_count: u16) -> usize {
        Self::BASE_LEN
            + RafflePaymentOption::LEN * payment_option_count as usize
            + RaffleReward::LEN * reward_count as usize
            + TicketHolder::LEN * max_holder_count as usize
    }

    pub fn name(&self) -> String {
        unpack_name(&self.name)
    }

    fn rewards_offset(&self) -> usize {
        Self::BASE_LEN + RafflePaymentOption::LEN * self.payment_option_count as usize
    }

    fn holders_offset(&self) -> usize {
        self.rewards_offset() + RaffleReward::LEN * self.reward_count as usize
    }

    pub fn unpack(src: &[u8]) -> Result<Self, ProgramError> {
        if src.len() < Self::BASE_LEN {
            return Err(ProgramError::InvalidAccountData);
        }
        let base = array_ref![src, 0, Raffle::BASE_LEN];
        let (
            discriminator,
            name,
            master_raffle,
            raffle,
            owner,
            vault,
            rng_bot,
            nonce,
            max_tickets_per_holder,
            payment_option_count,
            reward_count,
            max_holder_count,
            start_date,
            end_date,
            payment_option_len,
            reward_len,
            holder_len,
        ) = array_refs![base, 8, 64, 32, 32, 32, 32, 32, 1, 1, 1, 1, 2, 8, 8, 4, 4, 4];

        if *discriminator != RAFFLE_DISCRIMINATOR {
            return Err(ProgramError::UninitializedAccount);
        }

        let mut raffle = Raffle {
            discriminator: *discriminator,
            name: *name,
            master_raffle: Pubkey::new_from_array(*master_raffle),
            raffle: Pubkey::new_from_array(*raffle),
            owner: Pubkey::new_from_array(*owner),
            vault: Pubkey::new_from_array(*vault),
            rng_bot: Pubkey::new_from_array(*rng_bot),
            nonce: nonce[0],
            max_tickets_per_holder: max_tickets_per_holder[0],
            payment_option_count: payment_option_count[0],
            reward_count: reward_count[0],
            max_holder_count: u16::from_le_bytes(*max_holder_count),
            start_date: u64::from_le_bytes(*start_date),
            end_date: u64::from_le_bytes(*end_date),
            payment_options: Vec::new(),
            rewards: Vec::new(),
            holders: Vec::new(),
        };

        let payment_option_len = u32::from_le_bytes(*payment_option_len) as usize;
        let reward_len = u32::from_le_bytes(*reward_len) as usize;
        let holder_len = u32::from_le_bytes(*holder_len) as usize;
        if payment_option_len > raffle.payment_option_count as usize
            || reward_len > raffle.reward_count as usize
            || holder_len > raffle.max_holder_count as usize
            || src.len()
                < Self::space(
                    raffle.payment_option_count,
                    raffle.reward_count,
                    raffle.max_holder_count,
                )
        {
            return Err(ProgramError::InvalidAccountData);
        }

        raffle.payment_options = (0..payment_option_len)
            .map(|i| {
                let offset = Self::BASE_LEN + RafflePaymentOption::LEN * i;
                RafflePaymentOption::unpack_from_slice(&src[offset..])
            })
            .collect::<Result<_, _>>()?;
        let rewards_offset = raffle.rewards_offset();
        raffle.rewards = (0..reward_len)
            .map(|i| RaffleReward::unpack_from_slice(&src[rewards_offset + RaffleReward::LEN * i..]))
            .collect::<Result<_, _>>()?;
        let holders_offset = raffle.holders_offset();
        raffle.holders = (0..holder_len)
            .map(|i| TicketHolder::unpack_from_slice(&src[holders_offset + TicketHolder::LEN * i..]))
            .collect::<Result<_, _>>()?;

        Ok(raffle)
    }

    pub fn pack(&self, dst: &mut [u8]) -> Result<(), ProgramError> {
        if dst.len() < Self::space(self.payment_option_count, self.reward_count, self.max_holder_count)
            || self.payment_options.len() > self.payment_option_count as usize
            || self.rewards.len() > self.reward_count as usize
            || self.holders.len() > self.max_holder_count as usize
        {
            return Err(ProgramError::AccountDataTooSmall);
        }

        let base = array_mut_ref![dst, 0, Raffle::BASE_LEN];
        let (
            discriminator_dst,
            name_dst,
            master_raffle_dst,
            raffle_dst,
            owner_dst,
            vault_dst,
            rng_bot_dst,
            nonce_dst,
            max_tickets_per_holder_dst,
            payment_option_count_dst,
            reward_count_dst,
            max_holder_count_dst,
            start_date_dst,
            end_date_dst,
            payment_option_len_dst,
            reward_len_dst,
            holder_len_dst,
        ) = mut_array_refs![base, 8, 64, 32, 32, 32, 32, 32, 1, 1, 1, 1, 2, 8, 8, 4, 4, 4];

        *discriminator_dst = self.discriminator;
        name_dst.copy_from_slice(&self.name);
        master_raffle_dst.copy_from_slice(self.master_raffle.as_ref());
        raffle_dst.copy_from_slice(self.raffle.as_ref());
        owner_dst.copy_from_slice(self.owner.as_ref());
        vault_dst.copy_from_slice(self.vault.as_ref());
        rng_bot_dst.copy_from_slice(self.rng_bot.as_ref());
        nonce_dst[0] = self.nonce;
        max_tickets_per_holder_dst[0] = self.max_tickets_per_holder;
        payment_option_count_dst[0] = self.payment_option_count;
        reward_count_dst[0] = self.reward_count;
        *max_holder_count_dst = self.max_holder_count.to_le_bytes();
        *start_date_dst = self.start_date.to_le_bytes();
        *end_date_dst = self.end_date.to_le_bytes();
        *payment_option_len_dst = (self.payment_options.len() as u32).to_le_bytes();
        *reward_len_dst = (self.rewards.len() as u32).to_le_bytes();
        *holder_len_dst = (self.holders.len() as u32).to_le_bytes();

        for (i, option) in self.payment_options.iter().enumerate() {
            option.pack_into_slice(&mut dst[Self::BASE_LEN + RafflePaymentOption::LEN * i..]);
        }
        let rewards_offset = self.rewards_offset();
        for (i, reward) in self.rewards.iter().enumerate() {
            reward.pack_into_slice(&mut dst[rewards_offset + RaffleReward::LEN * i..]);
        }
        let holders_offset = self.holders_offset();
        for (i, holder) in self.holders.iter().enumerate() {
            holder.pack_into_slice(&mut dst[holders_offset + TicketHolder::LEN * i..]);
        }
        Ok(())
    }
}

impl IsInitialized for Raffle {
    fn is_initialized(&self) -> bool {
        self.discriminator == RAFFLE_DISCRIMINATOR
    }
}

/// Randomness bookkeeping shared by every raffle of one master raffle
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RngState {
    pub discriminator: [u8; 8],
    pub master_raffle: Pubkey,
    /// VRF binding this state tracks
    pub vrf_account: Pubkey,
    /// Requests submitted through this program
    pub request_counter: u64,
    /// Unix time of the last submitted request
    pub last_request_time: u64,
    /// Unix time the last fulfilled value was consumed
    pub last_fulfilled_time: u64,
    /// Last fulfilled value consumed by a winner pick
    pub last_result: [u8; 32],
    /// Set by a request, cleared once its value is consumed or the binding is replaced
    pub request_in_flight: bool,
    pub bump: u8,
}

impl Sealed for RngState {}

impl IsInitialized for RngState {
    fn is_initialized(&self) -> bool {
        self.discriminator == RNG_STATE_DISCRIMINATOR
    }
}

impl Pack for RngState {
    const LEN: usize = 8 + 32 + 32 + 8 + 8 + 8 + 32 + 1 + 1;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, RngState::LEN];
        let (
            discriminator,
            master_raffle,
            vrf_account,
            request_counter,
            last_request_time,
            last_fulfilled_time,
            last_result,
            request_in_flight,
            bump,
        ) = array_refs![src, 8, 32, 32, 8, 8, 8, 32, 1, 1];

        Ok(RngState {
            discriminator: *discriminator,
            master_raffle: Pubkey::new_from_array(*master_raffle),
            vrf_account: Pubkey::new_from_array(*vrf_account),
            request_counter: u64::from_le_bytes(*request_counter),
            last_request_time: u64::from_le_bytes(*last_request_time),
            last_fulfilled_time: u64::from_le_bytes(*last_fulfilled_time),
            last_result: *last_result,
            request_in_flight: unpack_bool(request_in_flight)?,
            bump: bump[0],
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, RngState::LEN];
        let (
            discriminator_dst,
            master_raffle_dst,
            vrf_account_dst,
            request_counter_dst,
            last_request_time_dst,
            last_fulfilled_time_dst,
            last_result_dst,
            request_in_flight_dst,
            bump_dst,
        ) = mut_array_refs![dst, 8, 32, 32, 8, 8, 8, 32, 1, 1];

        *discriminator_dst = self.discriminator;
        master_raffle_dst.copy_from_slice(self.master_raffle.as_ref());
        vrf_account_dst.copy_from_slice(self.vrf_account.as_ref());
        *request_counter_dst = self.request_counter.to_le_bytes();
        *last_request_time_dst = self.last_request_time.to_le_bytes();
        *last_fulfilled_time_dst = self.last_fulfilled_time.to_le_bytes();
        *last_result_dst = self.last_result;
        request_in_flight_dst[0] = self.request_in_flight as u8;
        bump_dst[0] = self.bump;
    }
}
