// Raffle Registry Program - Utility Functions
use solana_program::pubkey::Pubkey;
use switchboard_v2::{PERMISSION_SEED, STATE_SEED};

use crate::{
    constants::{MAX_NAME_LENGTH, RNG_STATE_SEED},
    raffle_error::RaffleError,
};

/// Pack a human readable name into its fixed, zero padded field
pub fn pack_name(name: &str) -> Result<[u8; MAX_NAME_LENGTH], RaffleError> {
    let bytes = name.as_bytes();
    if bytes.len() > MAX_NAME_LENGTH {
        return Err(RaffleError::NameTooLong);
    }
    let mut packed = [0u8; MAX_NAME_LENGTH];
    packed[..bytes.len()].copy_from_slice(bytes);
    Ok(packed)
}

/// Read a fixed name field back, dropping the zero padding
pub fn unpack_name(packed: &[u8; MAX_NAME_LENGTH]) -> String {
    let end = packed
        .iter()
        .rposition(|b| *b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    String::from_utf8_lossy(&packed[..end]).into_owned()
}

/// Find the randomness state PDA of a master raffle
pub fn find_rng_state_address(program_id: &Pubkey, master_raffle: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[RNG_STATE_SEED, master_raffle.as_ref()], program_id)
}

/// Find the oracle's queue permission PDA for a VRF binding
pub fn find_oracle_permission_address(
    oracle_program_id: &Pubkey,
    queue_authority: &Pubkey,
    oracle_queue: &Pubkey,
    vrf_account: &Pubkey,
) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            PERMISSION_SEED,
            queue_authority.as_ref(),
            oracle_queue.as_ref(),
            vrf_account.as_ref(),
        ],
        oracle_program_id,
    )
}

/// Find the oracle program's global state PDA, which owns every VRF escrow
pub fn find_oracle_state_address(oracle_program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[STATE_SEED], oracle_program_id)
}
