use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_program, sysvar,
};
use spl_associated_token_account::get_associated_token_address;

use crate::{
    escrow::{derive_vault, vault_asset_address},
    utils::{find_oracle_permission_address, find_oracle_state_address, find_rng_state_address},
};

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
pub enum RaffleInstruction {
    /// Create a master raffle and its randomness state
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The owner, pays for the randomness state
    /// 1. `[writable]` The master raffle account, allocated to this program and uninitialized
    /// 2. `[writable]` The randomness state PDA
    /// 3. `[]` The oracle program
    /// 4. `[]` The VRF account owned by the oracle
    /// 5. `[]` The RNG bot
    /// 6. `[]` The system program
    CreateMasterRaffle {
        name: String,
        /// Raffle slots, 1 to 5000
        max_raffles: u16,
    },

    /// Create a raffle under a master raffle
    ///
    /// Accounts expected:
    /// 0. `[signer]` The owner, must own the master raffle
    /// 1. `[writable]` The master raffle
    /// 2. `[writable]` The raffle account, allocated to this program and uninitialized
    /// 3. `[]` The vault PDA of the raffle
    CreateRaffle {
        name: String,
        max_tickets_per_holder: u8,
        payment_option_count: u8,
        reward_count: u8,
        max_holder_count: u16,
    },

    /// Append a payment option and provision the vault token account for its mint
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The raffle owner
    /// 1. `[writable]` The raffle
    /// 2. `[]` The vault PDA
    /// 3. `[writable]` The vault token account for the payment mint
    /// 4. `[]` The payment mint
    /// 5. `[]` The system program
    /// 6. `[]` The token program
    /// 7. `[]` The associated token account program
    LoadPaymentOption {
        name: String,
        /// Price of one purchase unit
        price: u64,
        /// Tickets granted per purchase unit
        tickets_per_payment: u8,
    },

    /// Append a reward and move it from the owner into the vault
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The raffle owner
    /// 1. `[writable]` The raffle
    /// 2. `[]` The vault PDA
    /// 3. `[writable]` The vault token account for the reward mint
    /// 4. `[writable]` The owner's token account holding the reward
    /// 5. `[]` The reward mint
    /// 6. `[]` The system program
    /// 7. `[]` The token program
    /// 8. `[]` The associated token account program
    LoadReward {
        name: String,
        /// Rewards sharing a non-zero group id go to one winner
        group_id: Pubkey,
        amount: u64,
    },

    /// Open ticket sales until `end_date`
    ///
    /// Accounts expected:
    /// 0. `[signer]` The raffle owner
    /// 1. `[writable]` The raffle
    StartRaffle {
        /// Unix time ticket sales stop
        end_date: u64,
    },

    /// Buy tickets through one payment option
    ///
    /// Accounts expected:
    /// 0. `[signer]` The buyer
    /// 1. `[writable]` The raffle
    /// 2. `[writable]` The buyer's token account for the payment mint
    /// 3. `[writable]` The vault token account for the payment mint
    /// 4. `[]` The token program
    BuyTickets {
        payment_option_index: u8,
        /// Purchase units, each costing the option's price
        units: u8,
    },

    /// Ask the bound oracle for a new random value
    ///
    /// Accounts expected:
    /// 0. `[signer]` The master raffle owner or its RNG bot, pays the request fee
    /// 1. `[]` The master raffle
    /// 2. `[writable]` The randomness state PDA, the VRF authority
    /// 3. `[]` The oracle program
    /// 4. `[writable]` The VRF account
    /// 5. `[writable]` The oracle queue
    /// 6. `[]` The oracle queue authority
    /// 7. `[]` The oracle queue data buffer
    /// 8. `[writable]` The oracle permission PDA for the VRF account
    /// 9. `[writable]` The VRF escrow
    /// 10. `[writable]` The requester's wrapped SOL fee vault
    /// 11. `[]` The recent blockhashes sysvar
    /// 12. `[]` The oracle program state PDA
    /// 13. `[]` The token program
    RequestRng,

    /// Assign winners of a closed raffle from the fulfilled random value
    ///
    /// Accounts expected:
    /// 0. `[signer]` The raffle owner or the master's RNG bot
    /// 1. `[]` The master raffle
    /// 2. `[writable]` The randomness state PDA
    /// 3. `[writable]` The raffle
    /// 4. `[]` The VRF account
    PickWinner,

    /// Move the tally of a payment option, and of every option sharing its mint, to the owner
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The raffle owner
    /// 1. `[writable]` The raffle
    /// 2. `[]` The vault PDA
    /// 3. `[writable]` The vault token account for the payment mint
    /// 4. `[writable]` The owner's associated token account for the payment mint
    /// 5. `[]` The payment mint
    /// 6. `[]` The system program
    /// 7. `[]` The token program
    /// 8. `[]` The associated token account program
    CashOutOwner { payment_option_index: u8 },

    /// Transfer a reward to its winner
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The winner
    /// 1. `[writable]` The raffle
    /// 2. `[]` The vault PDA
    /// 3. `[writable]` The vault token account for the reward mint
    /// 4. `[writable]` The winner's associated token account for the reward mint
    /// 5. `[]` The reward mint
    /// 6. `[]` The system program
    /// 7. `[]` The token program
    /// 8. `[]` The associated token account program
    RedeemReward { reward_index: u8 },

    /// Drop a cleared raffle from its master raffle
    ///
    /// Accounts expected:
    /// 0. `[signer]` The raffle owner
    /// 1. `[writable]` The master raffle
    /// 2. `[]` The raffle
    RemoveRaffleFromMaster,

    /// Rebind the oracle, VRF account and RNG bot of a master raffle
    ///
    /// Accounts expected:
    /// 0. `[signer]` The master raffle owner
    /// 1. `[writable]` The master raffle
    /// 2. `[writable]` The randomness state PDA
    /// 3. `[]` The new oracle program
    /// 4. `[]` The new VRF account
    /// 5. `[]` The new RNG bot
    /// 6.. `[writable]` Optional member raffles whose bot is refreshed right away
    UpdateMasterRaffleRngBinding,

    /// Destroy a settled raffle that was removed from its master raffle
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The raffle owner, receives the lamports
    /// 1. `[writable]` The raffle
    /// 2. `[]` The master raffle
    CloseRaffle,
}

impl RaffleInstruction {
    /// Unpacks a byte buffer into a RaffleInstruction
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        Self::try_from_slice(input).map_err(|_| ProgramError::InvalidInstructionData)
    }

    /// Packs a RaffleInstruction into a byte buffer
    pub fn pack(&self) -> Result<Vec<u8>, ProgramError> {
        self.try_to_vec()
            .map_err(|e| ProgramError::BorshIoError(e.to_string()))
    }
}

#[allow(clippy::too_many_arguments)]
pub fn create_master_raffle(
    program_id: &Pubkey,
    owner: &Pubkey,
    master_raffle: &Pubkey,
    oracle_program: &Pubkey,
    vrf_account: &Pubkey,
    rng_bot: &Pubkey,
    name: &str,
    max_raffles: u16,
) -> Result<Instruction, ProgramError> {
    let (rng_state, _) = find_rng_state_address(program_id, master_raffle);
    let data = RaffleInstruction::CreateMasterRaffle {
        name: name.to_string(),
        max_raffles,
    }
    .pack()?;

    let accounts = vec![
        AccountMeta::new(*owner, true),
        AccountMeta::new(*master_raffle, false),
        AccountMeta::new(rng_state, false),
        AccountMeta::new_readonly(*oracle_program, false),
        AccountMeta::new_readonly(*vrf_account, false),
        AccountMeta::new_readonly(*rng_bot, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn create_raffle(
    program_id: &Pubkey,
    owner: &Pubkey,
    master_raffle: &Pubkey,
    raffle: &Pubkey,
    name: &str,
    max_tickets_per_holder: u8,
    payment_option_count: u8,
    reward_count: u8,
    max_holder_count: u16,
) -> Result<Instruction, ProgramError> {
    let (vault, _) = derive_vault(program_id, raffle)?;
    let data = RaffleInstruction::CreateRaffle {
        name: name.to_string(),
        max_tickets_per_holder,
        payment_option_count,
        reward_count,
        max_holder_count,
    }
    .pack()?;

    let accounts = vec![
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new(*master_raffle, false),
        AccountMeta::new(*raffle, false),
        AccountMeta::new_readonly(vault, false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

pub fn load_payment_option(
    program_id: &Pubkey,
    owner: &Pubkey,
    raffle: &Pubkey,
    payment_mint: &Pubkey,
    name: &str,
    price: u64,
    tickets_per_payment: u8,
) -> Result<Instruction, ProgramError> {
    let (vault, _) = derive_vault(program_id, raffle)?;
    let data = RaffleInstruction::LoadPaymentOption {
        name: name.to_string(),
        price,
        tickets_per_payment,
    }
    .pack()?;

    let accounts = vec![
        AccountMeta::new(*owner, true),
        AccountMeta::new(*raffle, false),
        AccountMeta::new_readonly(vault, false),
        AccountMeta::new(vault_asset_address(&vault, payment_mint), false),
        AccountMeta::new_readonly(*payment_mint, false),
        AccountMeta::new_readonly(system_program::id(), false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(spl_associated_token_account::id(), false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

pub fn load_reward(
    program_id: &Pubkey,
    owner: &Pubkey,
    raffle: &Pubkey,
    reward_mint: &Pubkey,
    name: &str,
    group_id: &Pubkey,
    amount: u64,
) -> Result<Instruction, ProgramError> {
    let (vault, _) = derive_vault(program_id, raffle)?;
    let data = RaffleInstruction::LoadReward {
        name: name.to_string(),
        group_id: *group_id,
        amount,
    }
    .pack()?;

    let accounts = vec![
        AccountMeta::new(*owner, true),
        AccountMeta::new(*raffle, false),
        AccountMeta::new_readonly(vault, false),
        AccountMeta::new(vault_asset_address(&vault, reward_mint), false),
        AccountMeta::new(get_associated_token_address(owner, reward_mint), false),
        AccountMeta::new_readonly(*reward_mint, false),
        AccountMeta::new_readonly(system_program::id(), false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(spl_associated_token_account::id(), false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

pub fn start_raffle(
    program_id: &Pubkey,
    owner: &Pubkey,
    raffle: &Pubkey,
    end_date: u64,
) -> Result<Instruction, ProgramError> {
    let data = RaffleInstruction::StartRaffle { end_date }.pack()?;

    let accounts = vec![
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new(*raffle, false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

/// Buy from the buyer's associated token account
pub fn buy_tickets(
    program_id: &Pubkey,
    buyer: &Pubkey,
    raffle: &Pubkey,
    payment_mint: &Pubkey,
    payment_option_index: u8,
    units: u8,
) -> Result<Instruction, ProgramError> {
    let (vault, _) = derive_vault(program_id, raffle)?;
    let data = RaffleInstruction::BuyTickets {
        payment_option_index,
        units,
    }
    .pack()?;

    let accounts = vec![
        AccountMeta::new_readonly(*buyer, true),
        AccountMeta::new(*raffle, false),
        AccountMeta::new(get_associated_token_address(buyer, payment_mint), false),
        AccountMeta::new(vault_asset_address(&vault, payment_mint), false),
        AccountMeta::new_readonly(spl_token::id(), false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

/// Oracle side keys of a randomness request that are not derived from the master raffle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OracleQueueKeys {
    pub oracle_queue: Pubkey,
    pub queue_authority: Pubkey,
    pub data_buffer: Pubkey,
    pub escrow: Pubkey,
}

pub fn request_rng(
    program_id: &Pubkey,
    requester: &Pubkey,
    master_raffle: &Pubkey,
    oracle_program: &Pubkey,
    vrf_account: &Pubkey,
    queue: &OracleQueueKeys,
) -> Result<Instruction, ProgramError> {
    let (rng_state, _) = find_rng_state_address(program_id, master_raffle);
    let (permission, _) = find_oracle_permission_address(
        oracle_program,
        &queue.queue_authority,
        &queue.oracle_queue,
        vrf_account,
    );
    let (program_state, _) = find_oracle_state_address(oracle_program);
    let fee_vault = get_associated_token_address(requester, &spl_token::native_mint::id());
    let data = RaffleInstruction::RequestRng.pack()?;

    let accounts = vec![
        AccountMeta::new(*requester, true),
        AccountMeta::new_readonly(*master_raffle, false),
        AccountMeta::new(rng_state, false),
        AccountMeta::new_readonly(*oracle_program, false),
        AccountMeta::new(*vrf_account, false),
        AccountMeta::new(queue.oracle_queue, false),
        AccountMeta::new_readonly(queue.queue_authority, false),
        AccountMeta::new_readonly(queue.data_buffer, false),
        AccountMeta::new(permission, false),
        AccountMeta::new(queue.escrow, false),
        AccountMeta::new(fee_vault, false),
        AccountMeta::new_readonly(sysvar::recent_blockhashes::id(), false),
        AccountMeta::new_readonly(program_state, false),
        AccountMeta::new_readonly(spl_token::id(), false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

pub fn pick_winner(
    program_id: &Pubkey,
    signer: &Pubkey,
    master_raffle: &Pubkey,
    raffle: &Pubkey,
    vrf_account: &Pubkey,
) -> Result<Instruction, ProgramError> {
    let (rng_state, _) = find_rng_state_address(program_id, master_raffle);
    let data = RaffleInstruction::PickWinner.pack()?;

    let accounts = vec![
        AccountMeta::new_readonly(*signer, true),
        AccountMeta::new_readonly(*master_raffle, false),
        AccountMeta::new(rng_state, false),
        AccountMeta::new(*raffle, false),
        AccountMeta::new_readonly(*vrf_account, false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

pub fn cash_out_owner(
    program_id: &Pubkey,
    owner: &Pubkey,
    raffle: &Pubkey,
    payment_mint: &Pubkey,
    payment_option_index: u8,
) -> Result<Instruction, ProgramError> {
    let (vault, _) = derive_vault(program_id, raffle)?;
    let data = RaffleInstruction::CashOutOwner {
        payment_option_index,
    }
    .pack()?;

    let accounts = vec![
        AccountMeta::new(*owner, true),
        AccountMeta::new(*raffle, false),
        AccountMeta::new_readonly(vault, false),
        AccountMeta::new(vault_asset_address(&vault, payment_mint), false),
        AccountMeta::new(get_associated_token_address(owner, payment_mint), false),
        AccountMeta::new_readonly(*payment_mint, false),
        AccountMeta::new_readonly(system_program::id(), false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(spl_associated_token_account::id(), false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

pub fn redeem_reward(
    program_id: &Pubkey,
    winner: &Pubkey,
    raffle: &Pubkey,
    reward_mint: &Pubkey,
    reward_index: u8,
) -> Result<Instruction, ProgramError> {
    let (vault, _) = derive_vault(program_id, raffle)?;
    let data = RaffleInstruction::RedeemReward { reward_index }.pack()?;

    let accounts = vec![
        AccountMeta::new(*winner, true),
        AccountMeta::new(*raffle, false),
        AccountMeta::new_readonly(vault, false),
        AccountMeta::new(vault_asset_address(&vault, reward_mint), false),
        AccountMeta::new(get_associated_token_address(winner, reward_mint), false),
        AccountMeta::new_readonly(*reward_mint, false),
        AccountMeta::new_readonly(system_program::id(), false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(spl_associated_token_account::id(), false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

pub fn remove_raffle_from_master(
    program_id: &Pubkey,
    owner: &Pubkey,
    master_raffle: &Pubkey,
    raffle: &Pubkey,
) -> Result<Instruction, ProgramError> {
    let data = RaffleInstruction::RemoveRaffleFromMaster.pack()?;

    let accounts = vec![
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new(*master_raffle, false),
        AccountMeta::new_readonly(*raffle, false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

pub fn update_master_raffle_rng_binding(
    program_id: &Pubkey,
    owner: &Pubkey,
    master_raffle: &Pubkey,
    oracle_program: &Pubkey,
    vrf_account: &Pubkey,
    rng_bot: &Pubkey,
    member_raffles: &[Pubkey],
) -> Result<Instruction, ProgramError> {
    let (rng_state, _) = find_rng_state_address(program_id, master_raffle);
    let data = RaffleInstruction::UpdateMasterRaffleRngBinding.pack()?;

    let mut accounts = vec![
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new(*master_raffle, false),
        AccountMeta::new(rng_state, false),
        AccountMeta::new_readonly(*oracle_program, false),
        AccountMeta::new_readonly(*vrf_account, false),
        AccountMeta::new_readonly(*rng_bot, false),
    ];
    accounts.extend(member_raffles.iter().map(|raffle| AccountMeta::new(*raffle, false)));

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

pub fn close_raffle(
    program_id: &Pubkey,
    owner: &Pubkey,
    raffle: &Pubkey,
    master_raffle: &Pubkey,
) -> Result<Instruction, ProgramError> {
    let data = RaffleInstruction::CloseRaffle.pack()?;

    let accounts = vec![
        AccountMeta::new(*owner, true),
        AccountMeta::new(*raffle, false),
        AccountMeta::new_readonly(*master_raffle, false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}
