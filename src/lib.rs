// Raffle Registry
// Master raffles, ticket ledgers, escrow vaults and VRF driven winner selection on Solana

pub mod constants;
pub mod escrow;
pub mod master_registry;
pub mod raffle_error;
pub mod raffle_instruction;
pub mod raffle_ledger;
pub mod raffle_processor;
pub mod raffle_state;
pub mod utils;
pub mod vrf;

#[cfg(not(feature = "no-entrypoint"))]
pub mod raffle_entrypoint;

use solana_program::{account_info::AccountInfo, entrypoint::ProgramResult, pubkey::Pubkey};

/// Processes an instruction, for tests and for linking the program as a library
pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    raffle_processor::Processor::process(program_id, accounts, instruction_data)
}
