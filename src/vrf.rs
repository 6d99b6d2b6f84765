// Switchboard VRF client: reads the oracle's VRF account, submits requests
// and maps fulfilled values onto tickets
use anchor_lang::prelude::Account;
use anchor_spl::token::TokenAccount;
use arrayref::array_ref;
use solana_program::{
    account_info::AccountInfo, entrypoint::ProgramResult, hash::hashv, msg,
    program_error::ProgramError, pubkey::Pubkey,
};
use switchboard_v2::{VrfAccountData, VrfRequestRandomness, VrfStatus};

use crate::{constants::DRAW_DOMAIN, raffle_error::RaffleError};

/// Anchor discriminator followed by the zero copy payload
pub const VRF_ACCOUNT_LEN: usize = 8 + std::mem::size_of::<VrfAccountData>();

/// Status of the randomness request as seen by callers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RandomnessStatus {
    /// No request outstanding, or the last one failed verification
    Idle,
    Requesting,
    Verifying,
    /// A fulfilled value is available
    Complete,
}

impl From<VrfStatus> for RandomnessStatus {
    fn from(status: VrfStatus) -> Self {
        match status {
            VrfStatus::StatusNone | VrfStatus::StatusVerifyFailure => RandomnessStatus::Idle,
            VrfStatus::StatusRequesting => RandomnessStatus::Requesting,
            VrfStatus::StatusVerifying => RandomnessStatus::Verifying,
            VrfStatus::StatusVerified | VrfStatus::StatusCallbackSuccess => {
                RandomnessStatus::Complete
            }
        }
    }
}

/// The parts of a VRF account the raffle program acts on, copied out of the packed layout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VrfSnapshot {
    /// Must sign every randomness request
    pub authority: Pubkey,
    pub oracle_queue: Pubkey,
    /// Token account the request fee is paid into
    pub escrow: Pubkey,
    pub status: RandomnessStatus,
    /// Rounds requested so far
    pub counter: u128,
    result: Option<[u8; 32]>,
}

impl From<&VrfAccountData> for VrfSnapshot {
    fn from(vrf: &VrfAccountData) -> Self {
        let status = vrf.status;
        VrfSnapshot {
            authority: vrf.authority,
            oracle_queue: vrf.oracle_queue,
            escrow: vrf.escrow,
            status: status.into(),
            counter: vrf.counter,
            result: vrf.get_result().ok(),
        }
    }
}

impl VrfSnapshot {
    pub fn randomness_status(&self) -> RandomnessStatus {
        self.status
    }

    /// The fulfilled value, once the request completed
    pub fn fulfilled_result(&self) -> Option<[u8; 32]> {
        match self.status {
            RandomnessStatus::Complete => self.result,
            _ => None,
        }
    }
}

/// Load the VRF account, checking it belongs to the bound oracle
pub fn load_vrf_account(
    vrf_account_info: &AccountInfo,
    oracle_program_id: &Pubkey,
) -> Result<VrfSnapshot, ProgramError> {
    if vrf_account_info.owner != oracle_program_id {
        msg!("VRF account not owned by the oracle program {}", oracle_program_id);
        return Err(RaffleError::BadVrfAccount.into());
    }
    if vrf_account_info.data_len() < VRF_ACCOUNT_LEN {
        msg!("VRF account data too small");
        return Err(RaffleError::BadVrfAccount.into());
    }
    let vrf = VrfAccountData::new(vrf_account_info).map_err(|_| {
        msg!("Account is not a Switchboard VRF account");
        ProgramError::from(RaffleError::BadVrfAccount)
    })?;
    Ok(VrfSnapshot::from(&*vrf))
}

/// Side effect free status read
pub fn poll_status(
    vrf_account_info: &AccountInfo,
    oracle_program_id: &Pubkey,
) -> Result<RandomnessStatus, ProgramError> {
    Ok(load_vrf_account(vrf_account_info, oracle_program_id)?.randomness_status())
}

/// What a polling caller should do next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollAction {
    Wait,
    Resubmit,
    Ready,
}

/// Client side polling policy. Not enforced on chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Resubmit after this many polls without progress
    pub resubmit_every: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            resubmit_every: 100,
        }
    }
}

impl PollPolicy {
    pub fn next_action(&self, status: RandomnessStatus, polls: u32) -> PollAction {
        match status {
            RandomnessStatus::Complete => PollAction::Ready,
            RandomnessStatus::Idle
                if self.resubmit_every > 0 && polls > 0 && polls % self.resubmit_every == 0 =>
            {
                PollAction::Resubmit
            }
            _ => PollAction::Wait,
        }
    }
}

/// Accounts of a randomness request, named as the oracle names them
pub struct RandomnessRequest<'a, 'info> {
    pub oracle_program: &'a AccountInfo<'info>,
    /// VRF authority, signs through its seeds
    pub authority: &'a AccountInfo<'info>,
    pub vrf: &'a AccountInfo<'info>,
    pub oracle_queue: &'a AccountInfo<'info>,
    pub queue_authority: &'a AccountInfo<'info>,
    pub data_buffer: &'a AccountInfo<'info>,
    pub permission: &'a AccountInfo<'info>,
    pub escrow: &'a AccountInfo<'info>,
    /// Wrapped SOL account paying the request fee
    pub payer_wallet: &'a AccountInfo<'info>,
    pub payer_authority: &'a AccountInfo<'info>,
    pub recent_blockhashes: &'a AccountInfo<'info>,
    pub program_state: &'a AccountInfo<'info>,
    pub token_program: &'a AccountInfo<'info>,
}

/// Submit a randomness request, signed by the VRF authority's seeds
pub fn request_randomness<'info>(
    request: &RandomnessRequest<'_, 'info>,
    state_bump: u8,
    permission_bump: u8,
    authority_seeds: &[&[u8]],
) -> ProgramResult {
    let escrow: Account<TokenAccount> = Account::try_from(request.escrow).map_err(|_| {
        msg!("VRF escrow {} is not a token account", request.escrow.key);
        ProgramError::from(RaffleError::BadVrfAccount)
    })?;
    let payer_wallet: Account<TokenAccount> = Account::try_from(request.payer_wallet)
        .map_err(|_| ProgramError::from(RaffleError::FeeVaultMissing))?;

    let cpi = VrfRequestRandomness {
        authority: request.authority.clone(),
        vrf: request.vrf.clone(),
        oracle_queue: request.oracle_queue.clone(),
        queue_authority: request.queue_authority.clone(),
        data_buffer: request.data_buffer.clone(),
        permission: request.permission.clone(),
        escrow,
        payer_wallet,
        payer_authority: request.payer_authority.clone(),
        recent_blockhashes: request.recent_blockhashes.clone(),
        program_state: request.program_state.clone(),
        token_program: request.token_program.clone(),
    };
    cpi.invoke_signed(
        request.oracle_program.clone(),
        state_bump,
        permission_bump,
        &[authority_seeds],
    )?;

    msg!("VRF randomness request submitted to {}", request.oracle_program.key);
    Ok(())
}

/// Map a fulfilled value onto a ticket for one reward group.
/// The draw is domain separated by raffle and group so groups never share a draw.
pub fn winning_ticket_index(
    randomness: &[u8; 32],
    raffle: &Pubkey,
    group_key: &[u8; 32],
    total_tickets: u32,
) -> Option<u32> {
    if total_tickets == 0 {
        return None;
    }
    let digest = hashv(&[DRAW_DOMAIN, randomness, raffle.as_ref(), group_key]).to_bytes();
    let draw = u128::from_le_bytes(*array_ref![digest, 0, 16]);
    Some((draw % total_tickets as u128) as u32)
}
