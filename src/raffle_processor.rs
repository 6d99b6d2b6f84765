use crate::constants::{MIN_FEE_BALANCE, RNG_STATE_DISCRIMINATOR, RNG_STATE_SEED};
use crate::escrow;
use crate::master_registry::{RaffleConfig, RngBinding};
use crate::raffle_error::{ErrorKind, RaffleError};
use crate::raffle_instruction::RaffleInstruction;
use crate::raffle_ledger::RaffleState;
use crate::raffle_state::{MasterRaffle, Raffle, RafflePaymentOption, RaffleReward, RngState};
use crate::utils::{
    find_oracle_permission_address, find_oracle_state_address, find_rng_state_address, pack_name,
};
use crate::vrf::{self, RandomnessStatus};

use solana_program::{
    account_info::{next_account_info, AccountInfo},
    entrypoint::ProgramResult,
    msg,
    program::invoke_signed,
    program_error::ProgramError,
    program_pack::Pack,
    pubkey::Pubkey,
    system_instruction,
    sysvar::{clock::Clock, rent::Rent, Sysvar},
};
use spl_associated_token_account::get_associated_token_address;

/// Log a rejection, with the raffle's lifecycle state when the operation was invalid for it
fn reject(error: RaffleError, state: Option<RaffleState>) -> ProgramError {
    msg!("Error: {}", error);
    if let (ErrorKind::State, Some(state)) = (error.kind(), state) {
        msg!("Raffle is {:?}", state);
    }
    error.into()
}

fn unix_now() -> Result<u64, ProgramError> {
    let clock = Clock::get()?;
    u64::try_from(clock.unix_timestamp).map_err(|_| ProgramError::InvalidArgument)
}

/// A client allocated account about to be initialized by this program
fn check_allocation(info: &AccountInfo, program_id: &Pubkey, space: usize) -> ProgramResult {
    if info.owner != program_id {
        msg!("Account {} must be allocated to this program", info.key);
        return Err(ProgramError::IncorrectProgramId);
    }
    if info.data_len() < space {
        msg!("Account {} needs {} bytes, has {}", info.key, space, info.data_len());
        return Err(ProgramError::AccountDataTooSmall);
    }
    if info.data.borrow()[..8] != [0u8; 8] {
        msg!("Account {} is already initialized", info.key);
        return Err(ProgramError::AccountAlreadyInitialized);
    }
    if !Rent::get()?.is_exempt(info.lamports(), info.data_len()) {
        msg!("Account {} is not rent exempt", info.key);
        return Err(ProgramError::AccountNotRentExempt);
    }
    Ok(())
}

fn load_master_raffle(info: &AccountInfo, program_id: &Pubkey) -> Result<MasterRaffle, ProgramError> {
    if info.owner != program_id {
        msg!("Master raffle must be owned by this program");
        return Err(ProgramError::IncorrectProgramId);
    }
    let master = MasterRaffle::unpack(&info.data.borrow())?;
    if master.master_raffle != *info.key {
        msg!("Master raffle account does not match its record");
        return Err(RaffleError::AccountMismatch.into());
    }
    Ok(master)
}

fn load_raffle(info: &AccountInfo, program_id: &Pubkey) -> Result<Raffle, ProgramError> {
    if info.owner != program_id {
        msg!("Raffle must be owned by this program");
        return Err(ProgramError::IncorrectProgramId);
    }
    let raffle = Raffle::unpack(&info.data.borrow())?;
    if raffle.raffle != *info.key {
        msg!("Raffle account does not match its record");
        return Err(RaffleError::AccountMismatch.into());
    }
    Ok(raffle)
}

fn load_rng_state(
    info: &AccountInfo,
    program_id: &Pubkey,
    master_raffle: &Pubkey,
) -> Result<RngState, ProgramError> {
    if info.owner != program_id {
        msg!("Randomness state must be owned by this program");
        return Err(ProgramError::IncorrectProgramId);
    }
    let rng_state = RngState::unpack(&info.data.borrow())?;
    let expected = Pubkey::create_program_address(
        &[RNG_STATE_SEED, master_raffle.as_ref(), &[rng_state.bump]],
        program_id,
    )?;
    if rng_state.master_raffle != *master_raffle || expected != *info.key {
        msg!("Randomness state does not belong to master raffle {}", master_raffle);
        return Err(ProgramError::InvalidSeeds);
    }
    Ok(rng_state)
}

fn check_signer(info: &AccountInfo, role: &str) -> ProgramResult {
    if !info.is_signer {
        msg!("{} must sign the transaction", role);
        return Err(ProgramError::MissingRequiredSignature);
    }
    Ok(())
}

fn check_raffle_owner(raffle: &Raffle, owner_info: &AccountInfo) -> ProgramResult {
    if raffle.owner != *owner_info.key {
        return Err(reject(RaffleError::NotRaffleOwner, None));
    }
    Ok(())
}

fn check_vault(raffle: &Raffle, vault_info: &AccountInfo) -> ProgramResult {
    if raffle.vault != *vault_info.key {
        msg!("Vault {} is not the vault of this raffle", vault_info.key);
        return Err(RaffleError::AccountMismatch.into());
    }
    Ok(())
}

fn check_token_program(info: &AccountInfo) -> ProgramResult {
    if *info.key != spl_token::id() {
        msg!("Unexpected token program {}", info.key);
        return Err(ProgramError::IncorrectProgramId);
    }
    Ok(())
}

/// The vault's token account for `mint`, checked against the vault
fn load_vault_token(
    raffle: &Raffle,
    vault_token_info: &AccountInfo,
    mint: &Pubkey,
) -> Result<spl_token::state::Account, ProgramError> {
    if *vault_token_info.key != escrow::vault_asset_address(&raffle.vault, mint) {
        msg!("Vault token account does not match mint {}", mint);
        return Err(RaffleError::AccountMismatch.into());
    }
    escrow::check_token_account(vault_token_info, &raffle.vault, mint)
}

pub struct Processor;

impl Processor {
    pub fn process(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = RaffleInstruction::unpack(instruction_data)?;

        match instruction {
            RaffleInstruction::CreateMasterRaffle { name, max_raffles } => {
                msg!("Instruction: Create Master Raffle");
                Self::process_create_master_raffle(accounts, name, max_raffles, program_id)
            }
            RaffleInstruction::CreateRaffle {
                name,
                max_tickets_per_holder,
                payment_option_count,
                reward_count,
                max_holder_count,
            } => {
                msg!("Instruction: Create Raffle");
                let config = RaffleConfig {
                    max_tickets_per_holder,
                    payment_option_count,
                    reward_count,
                    max_holder_count,
                };
                Self::process_create_raffle(accounts, name, config, program_id)
            }
            RaffleInstruction::LoadPaymentOption {
                name,
                price,
                tickets_per_payment,
            } => {
                msg!("Instruction: Load Payment Option");
                Self::process_load_payment_option(accounts, name, price, tickets_per_payment, program_id)
            }
            RaffleInstruction::LoadReward {
                name,
                group_id,
                amount,
            } => {
                msg!("Instruction: Load Reward");
                Self::process_load_reward(accounts, name, group_id, amount, program_id)
            }
            RaffleInstruction::StartRaffle { end_date } => {
                msg!("Instruction: Start Raffle");
                Self::process_start_raffle(accounts, end_date, program_id)
            }
            RaffleInstruction::BuyTickets {
                payment_option_index,
                units,
            } => {
                msg!("Instruction: Buy Tickets");
                Self::process_buy_tickets(accounts, payment_option_index, units, program_id)
            }
            RaffleInstruction::RequestRng => {
                msg!("Instruction: Request RNG");
                Self::process_request_rng(accounts, program_id)
            }
            RaffleInstruction::PickWinner => {
                msg!("Instruction: Pick Winner");
                Self::process_pick_winner(accounts, program_id)
            }
            RaffleInstruction::CashOutOwner {
                payment_option_index,
            } => {
                msg!("Instruction: Cash Out Owner");
                Self::process_cash_out_owner(accounts, payment_option_index, program_id)
            }
            RaffleInstruction::RedeemReward { reward_index } => {
                msg!("Instruction: Redeem Reward");
                Self::process_redeem_reward(accounts, reward_index, program_id)
            }
            RaffleInstruction::RemoveRaffleFromMaster => {
                msg!("Instruction: Remove Raffle From Master");
                Self::process_remove_raffle_from_master(accounts, program_id)
            }
            RaffleInstruction::UpdateMasterRaffleRngBinding => {
                msg!("Instruction: Update Master Raffle RNG Binding");
                Self::process_update_rng_binding(accounts, program_id)
            }
            RaffleInstruction::CloseRaffle => {
                msg!("Instruction: Close Raffle");
                Self::process_close_raffle(accounts, program_id)
            }
        }
    }

    fn process_create_master_raffle(
        accounts: &[AccountInfo],
        name: String,
        max_raffles: u16,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner_info = next_account_info(account_info_iter)?;
        let master_info = next_account_info(account_info_iter)?;
        let rng_state_info = next_account_info(account_info_iter)?;
        let oracle_info = next_account_info(account_info_iter)?;
        let vrf_info = next_account_info(account_info_iter)?;
        let rng_bot_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        check_signer(owner_info, "Owner")?;

        let master = MasterRaffle::new(
            *master_info.key,
            &name,
            *owner_info.key,
            max_raffles,
            RngBinding {
                oracle: *oracle_info.key,
                vrf_account: *vrf_info.key,
                rng_bot: *rng_bot_info.key,
            },
        )
        .map_err(|e| reject(e, None))?;
        check_allocation(master_info, program_id, MasterRaffle::space(max_raffles))?;

        // The randomness state signs oracle requests, so it must be the VRF authority
        let (rng_state_key, bump) = find_rng_state_address(program_id, master_info.key);
        if rng_state_key != *rng_state_info.key {
            msg!("Randomness state address does not match the master raffle");
            return Err(ProgramError::InvalidSeeds);
        }
        let vrf_account = vrf::load_vrf_account(vrf_info, oracle_info.key)?;
        if vrf_account.authority != rng_state_key {
            msg!("VRF authority must be the randomness state {}", rng_state_key);
            return Err(RaffleError::BadVrfAccount.into());
        }
        if rng_state_info.owner == program_id {
            msg!("Randomness state already exists");
            return Err(ProgramError::AccountAlreadyInitialized);
        }

        let rent = Rent::get()?;
        invoke_signed(
            &system_instruction::create_account(
                owner_info.key,
                rng_state_info.key,
                rent.minimum_balance(RngState::LEN),
                RngState::LEN as u64,
                program_id,
            ),
            &[
                owner_info.clone(),
                rng_state_info.clone(),
                system_program_info.clone(),
            ],
            &[&[RNG_STATE_SEED, master_info.key.as_ref(), &[bump]]],
        )?;

        let rng_state = RngState {
            discriminator: RNG_STATE_DISCRIMINATOR,
            master_raffle: *master_info.key,
            vrf_account: *vrf_info.key,
            bump,
            ..RngState::default()
        };
        RngState::pack(rng_state, &mut rng_state_info.data.borrow_mut())?;
        master.pack(&mut master_info.data.borrow_mut())?;

        msg!(
            "Master raffle {} created: {} slots, oracle {}, vrf {}, bot {}",
            master_info.key,
            max_raffles,
            oracle_info.key,
            vrf_info.key,
            rng_bot_info.key
        );
        Ok(())
    }

    fn process_create_raffle(
        accounts: &[AccountInfo],
        name: String,
        config: RaffleConfig,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner_info = next_account_info(account_info_iter)?;
        let master_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let vault_info = next_account_info(account_info_iter)?;

        check_signer(owner_info, "Owner")?;

        let mut master = load_master_raffle(master_info, program_id)?;
        check_allocation(
            raffle_info,
            program_id,
            Raffle::space(
                config.payment_option_count,
                config.reward_count,
                config.max_holder_count,
            ),
        )?;

        let (vault, nonce) =
            escrow::derive_vault(program_id, raffle_info.key).map_err(|e| reject(e, None))?;
        if vault != *vault_info.key {
            msg!("Vault {} is not derived from raffle {}", vault_info.key, raffle_info.key);
            return Err(RaffleError::AccountMismatch.into());
        }

        let raffle = master
            .create_raffle(*raffle_info.key, &name, *owner_info.key, (vault, nonce), config)
            .map_err(|e| reject(e, None))?;

        raffle.pack(&mut raffle_info.data.borrow_mut())?;
        master.pack(&mut master_info.data.borrow_mut())?;

        msg!(
            "Raffle {} created in slot {} of {}, vault {}",
            raffle_info.key,
            master.raffles.len() - 1,
            master_info.key,
            vault
        );
        Ok(())
    }

    fn process_load_payment_option(
        accounts: &[AccountInfo],
        name: String,
        price: u64,
        tickets_per_payment: u8,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let vault_info = next_account_info(account_info_iter)?;
        let vault_token_info = next_account_info(account_info_iter)?;
        let mint_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;
        let token_program_info = next_account_info(account_info_iter)?;
        let ata_program_info = next_account_info(account_info_iter)?;

        check_signer(owner_info, "Raffle owner")?;
        let mut raffle = load_raffle(raffle_info, program_id)?;
        check_raffle_owner(&raffle, owner_info)?;
        check_vault(&raffle, vault_info)?;
        if mint_info.owner != &spl_token::id() {
            msg!("Payment mint must be a token mint");
            return Err(RaffleError::BadMint.into());
        }

        let state = raffle.lifecycle(unix_now()?, None, true);
        let option = RafflePaymentOption {
            name: pack_name(&name).map_err(|e| reject(e, None))?,
            payment_mint: *mint_info.key,
            price,
            tickets_per_payment,
            payment_tally: 0,
            cashed_out: false,
        };
        raffle
            .load_payment_option(option)
            .map_err(|e| reject(e, Some(state)))?;

        escrow::provision_vault_for_asset(
            owner_info,
            vault_token_info,
            vault_info,
            mint_info,
            system_program_info,
            token_program_info,
            ata_program_info,
        )?;

        raffle.pack(&mut raffle_info.data.borrow_mut())?;

        msg!(
            "Payment option {} loaded: {} of {} for {} tickets",
            raffle.payment_options.len() - 1,
            price,
            mint_info.key,
            tickets_per_payment
        );
        Ok(())
    }

    fn process_load_reward(
        accounts: &[AccountInfo],
        name: String,
        group_id: Pubkey,
        amount: u64,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let vault_info = next_account_info(account_info_iter)?;
        let vault_token_info = next_account_info(account_info_iter)?;
        let source_info = next_account_info(account_info_iter)?;
        let mint_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;
        let token_program_info = next_account_info(account_info_iter)?;
        let ata_program_info = next_account_info(account_info_iter)?;

        check_signer(owner_info, "Raffle owner")?;
        let mut raffle = load_raffle(raffle_info, program_id)?;
        check_raffle_owner(&raffle, owner_info)?;
        check_vault(&raffle, vault_info)?;
        check_token_program(token_program_info)?;

        let state = raffle.lifecycle(unix_now()?, None, true);
        let reward = RaffleReward {
            name: pack_name(&name).map_err(|e| reject(e, None))?,
            reward_mint: *mint_info.key,
            group_id,
            winner: None,
            reward_amount: amount,
            redeemed: false,
        };
        raffle.load_reward(reward).map_err(|e| reject(e, Some(state)))?;

        let source = escrow::check_token_account(source_info, owner_info.key, mint_info.key)?;
        if source.amount < amount {
            msg!("Owner holds {} of the reward, needs {}", source.amount, amount);
            return Err(RaffleError::InsufficientRewardBalance.into());
        }

        escrow::provision_vault_for_asset(
            owner_info,
            vault_token_info,
            vault_info,
            mint_info,
            system_program_info,
            token_program_info,
            ata_program_info,
        )?;
        escrow::deposit(token_program_info, source_info, vault_token_info, owner_info, amount)?;

        raffle.pack(&mut raffle_info.data.borrow_mut())?;

        msg!(
            "Reward {} loaded: {} of {}, group {}",
            raffle.rewards.len() - 1,
            amount,
            mint_info.key,
            group_id
        );
        Ok(())
    }

    fn process_start_raffle(
        accounts: &[AccountInfo],
        end_date: u64,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;

        check_signer(owner_info, "Raffle owner")?;
        let mut raffle = load_raffle(raffle_info, program_id)?;
        check_raffle_owner(&raffle, owner_info)?;

        let now = unix_now()?;
        let state = raffle.lifecycle(now, None, true);
        raffle
            .start(end_date, now)
            .map_err(|e| reject(e, Some(state)))?;

        raffle.pack(&mut raffle_info.data.borrow_mut())?;

        msg!("Raffle {} started, ends at {}", raffle_info.key, end_date);
        Ok(())
    }

    fn process_buy_tickets(
        accounts: &[AccountInfo],
        payment_option_index: u8,
        units: u8,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let buyer_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let buyer_token_info = next_account_info(account_info_iter)?;
        let vault_token_info = next_account_info(account_info_iter)?;
        let token_program_info = next_account_info(account_info_iter)?;

        check_signer(buyer_info, "Buyer")?;
        check_token_program(token_program_info)?;
        let mut raffle = load_raffle(raffle_info, program_id)?;

        let now = unix_now()?;
        let state = raffle.lifecycle(now, None, true);
        let purchase = raffle
            .record_purchase(buyer_info.key, payment_option_index, units, now)
            .map_err(|e| reject(e, Some(state)))?;

        load_vault_token(&raffle, vault_token_info, &purchase.payment_mint)?;
        let source =
            escrow::check_token_account(buyer_token_info, buyer_info.key, &purchase.payment_mint)?;
        if source.amount < purchase.cost {
            msg!("Buyer holds {}, needs {}", source.amount, purchase.cost);
            return Err(RaffleError::NotEnoughToBuy.into());
        }

        escrow::deposit(
            token_program_info,
            buyer_token_info,
            vault_token_info,
            buyer_info,
            purchase.cost,
        )?;

        raffle.pack(&mut raffle_info.data.borrow_mut())?;

        msg!(
            "{} bought {} tickets for {}, now holds {}",
            buyer_info.key,
            purchase.tickets,
            purchase.cost,
            raffle.holder_ticket_count(buyer_info.key)
        );
        Ok(())
    }

    fn process_request_rng(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let requester_info = next_account_info(account_info_iter)?;
        let master_info = next_account_info(account_info_iter)?;
        let rng_state_info = next_account_info(account_info_iter)?;
        let oracle_info = next_account_info(account_info_iter)?;
        let vrf_info = next_account_info(account_info_iter)?;
        let queue_info = next_account_info(account_info_iter)?;
        let queue_authority_info = next_account_info(account_info_iter)?;
        let data_buffer_info = next_account_info(account_info_iter)?;
        let permission_info = next_account_info(account_info_iter)?;
        let escrow_info = next_account_info(account_info_iter)?;
        let fee_vault_info = next_account_info(account_info_iter)?;
        let recent_blockhashes_info = next_account_info(account_info_iter)?;
        let program_state_info = next_account_info(account_info_iter)?;
        let token_program_info = next_account_info(account_info_iter)?;

        check_signer(requester_info, "Requester")?;
        check_token_program(token_program_info)?;
        let master = load_master_raffle(master_info, program_id)?;
        if !master.is_rng_authority(requester_info.key) {
            return Err(reject(RaffleError::NotRngAuthority, None));
        }
        if *oracle_info.key != master.oracle || *vrf_info.key != master.vrf_account {
            msg!("Oracle or VRF account does not match the master raffle binding");
            return Err(RaffleError::AccountMismatch.into());
        }
        let mut rng_state = load_rng_state(rng_state_info, program_id, master_info.key)?;

        let vrf_account = vrf::load_vrf_account(vrf_info, oracle_info.key)?;
        match vrf_account.randomness_status() {
            RandomnessStatus::Requesting | RandomnessStatus::Verifying => {
                msg!("VRF status is {:?}", vrf_account.randomness_status());
                return Err(reject(RaffleError::RngRequestInFlight, None));
            }
            // A fulfilled value nobody has drawn with yet must not be replaced
            RandomnessStatus::Complete
                if rng_state.request_in_flight
                    && vrf_account.fulfilled_result() != Some(rng_state.last_result) =>
            {
                msg!("Fulfilled randomness has not been consumed yet");
                return Err(reject(RaffleError::RngRequestInFlight, None));
            }
            RandomnessStatus::Idle | RandomnessStatus::Complete => {}
        }
        if vrf_account.authority != *rng_state_info.key {
            msg!("VRF authority is not the randomness state");
            return Err(RaffleError::BadVrfAccount.into());
        }
        if vrf_account.oracle_queue != *queue_info.key || vrf_account.escrow != *escrow_info.key {
            return Err(reject(RaffleError::OracleAccountMismatch, None));
        }

        // Request fee comes out of the requester's wrapped SOL account
        let native_mint = spl_token::native_mint::id();
        if *fee_vault_info.key != get_associated_token_address(requester_info.key, &native_mint) {
            msg!("Fee vault must be the requester's wrapped SOL associated token account");
            return Err(RaffleError::AccountMismatch.into());
        }
        if fee_vault_info.owner != &spl_token::id() || fee_vault_info.data_is_empty() {
            return Err(reject(RaffleError::FeeVaultMissing, None));
        }
        let fee_vault =
            escrow::check_token_account(fee_vault_info, requester_info.key, &native_mint)?;
        if fee_vault.amount < MIN_FEE_BALANCE {
            msg!(
                "Fee vault holds {} lamports of wrapped SOL, needs {}",
                fee_vault.amount,
                MIN_FEE_BALANCE
            );
            return Err(reject(RaffleError::InsufficientFeeBalance, None));
        }

        let (permission, permission_bump) = find_oracle_permission_address(
            oracle_info.key,
            queue_authority_info.key,
            queue_info.key,
            vrf_info.key,
        );
        if permission != *permission_info.key
            || permission_info.owner != oracle_info.key
            || permission_info.data_is_empty()
        {
            return Err(reject(RaffleError::MissingOraclePermission, None));
        }
        let (program_state, state_bump) = find_oracle_state_address(oracle_info.key);
        if program_state != *program_state_info.key {
            return Err(reject(RaffleError::OracleAccountMismatch, None));
        }

        vrf::request_randomness(
            &vrf::RandomnessRequest {
                oracle_program: oracle_info,
                authority: rng_state_info,
                vrf: vrf_info,
                oracle_queue: queue_info,
                queue_authority: queue_authority_info,
                data_buffer: data_buffer_info,
                permission: permission_info,
                escrow: escrow_info,
                payer_wallet: fee_vault_info,
                payer_authority: requester_info,
                recent_blockhashes: recent_blockhashes_info,
                program_state: program_state_info,
                token_program: token_program_info,
            },
            state_bump,
            permission_bump,
            &[RNG_STATE_SEED, master_info.key.as_ref(), &[rng_state.bump]],
        )?;

        rng_state.request_in_flight = true;
        rng_state.last_request_time = unix_now()?;
        rng_state.request_counter = rng_state
            .request_counter
            .checked_add(1)
            .ok_or(RaffleError::MathOverflow)?;
        RngState::pack(rng_state, &mut rng_state_info.data.borrow_mut())?;

        msg!(
            "Randomness request {} submitted for master raffle {}",
            rng_state.request_counter,
            master_info.key
        );
        Ok(())
    }

    fn process_pick_winner(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let signer_info = next_account_info(account_info_iter)?;
        let master_info = next_account_info(account_info_iter)?;
        let rng_state_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let vrf_info = next_account_info(account_info_iter)?;

        check_signer(signer_info, "Raffle owner or RNG bot")?;
        let master = load_master_raffle(master_info, program_id)?;
        let mut raffle = load_raffle(raffle_info, program_id)?;
        if raffle.master_raffle != *master_info.key || !master.is_member(raffle_info.key) {
            return Err(reject(RaffleError::RaffleNotMember, None));
        }
        if master.sync_rng_bot(&mut raffle).map_err(|e| reject(e, None))? {
            msg!("Raffle bot refreshed to {}", raffle.rng_bot);
        }
        if *signer_info.key != raffle.owner && *signer_info.key != raffle.rng_bot {
            return Err(reject(RaffleError::NotRngAuthority, None));
        }
        if *vrf_info.key != master.vrf_account {
            msg!("VRF account does not match the master raffle binding");
            return Err(RaffleError::AccountMismatch.into());
        }
        let mut rng_state = load_rng_state(rng_state_info, program_id, master_info.key)?;

        let now = unix_now()?;
        let state = raffle.lifecycle(now, Some(&rng_state), true);
        if !raffle.is_closed(now) {
            return Err(reject(RaffleError::RaffleNotEnded, Some(state)));
        }
        if raffle.winners_assigned() {
            return Err(reject(RaffleError::WinnersAlreadyPicked, Some(state)));
        }

        let vrf_account = vrf::load_vrf_account(vrf_info, &master.oracle)?;
        let randomness = match vrf_account.fulfilled_result() {
            Some(result) => result,
            None => {
                msg!("VRF status is {:?}", vrf_account.randomness_status());
                return Err(reject(RaffleError::RandomnessNotFulfilled, Some(state)));
            }
        };
        if rng_state.last_request_time < raffle.end_date {
            msg!(
                "Last request at {} predates the raffle end at {}",
                rng_state.last_request_time,
                raffle.end_date
            );
            return Err(reject(RaffleError::StaleRandomness, Some(state)));
        }

        raffle
            .assign_winners(&randomness, now)
            .map_err(|e| reject(e, Some(state)))?;

        rng_state.last_result = randomness;
        rng_state.last_fulfilled_time = now;
        rng_state.request_in_flight = false;
        RngState::pack(rng_state, &mut rng_state_info.data.borrow_mut())?;
        raffle.pack(&mut raffle_info.data.borrow_mut())?;

        for (i, reward) in raffle.rewards.iter().enumerate() {
            if let Some(winner) = reward.winner {
                msg!("Reward {} won by {}", i, winner);
            }
        }
        Ok(())
    }

    fn process_cash_out_owner(
        accounts: &[AccountInfo],
        payment_option_index: u8,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let vault_info = next_account_info(account_info_iter)?;
        let vault_token_info = next_account_info(account_info_iter)?;
        let owner_token_info = next_account_info(account_info_iter)?;
        let mint_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;
        let token_program_info = next_account_info(account_info_iter)?;
        let ata_program_info = next_account_info(account_info_iter)?;

        check_signer(owner_info, "Raffle owner")?;
        check_token_program(token_program_info)?;
        let mut raffle = load_raffle(raffle_info, program_id)?;
        check_raffle_owner(&raffle, owner_info)?;
        check_vault(&raffle, vault_info)?;

        let now = unix_now()?;
        let state = raffle.lifecycle(now, None, true);
        let cash_out = raffle
            .record_cash_out(payment_option_index, now)
            .map_err(|e| reject(e, Some(state)))?;
        if cash_out.payment_mint != *mint_info.key {
            msg!("Payment option is paid in {}", cash_out.payment_mint);
            return Err(RaffleError::BadMint.into());
        }

        let vault_token = load_vault_token(&raffle, vault_token_info, &cash_out.payment_mint)?;
        if vault_token.amount < cash_out.amount {
            msg!(
                "Vault holds {} but the tallies record {}",
                vault_token.amount,
                cash_out.amount
            );
            return Err(reject(RaffleError::VaultBalanceMismatch, None));
        }

        escrow::ensure_associated_token_account(
            owner_info,
            owner_token_info,
            owner_info,
            mint_info,
            system_program_info,
            token_program_info,
            ata_program_info,
        )?;
        if cash_out.amount > 0 {
            escrow::withdraw(
                token_program_info,
                vault_token_info,
                owner_token_info,
                vault_info,
                program_id,
                raffle_info.key,
                raffle.nonce,
                cash_out.amount,
            )?;
        }

        raffle.pack(&mut raffle_info.data.borrow_mut())?;

        msg!(
            "Cashed out {} of {} to {}",
            cash_out.amount,
            cash_out.payment_mint,
            owner_info.key
        );
        Ok(())
    }

    fn process_redeem_reward(
        accounts: &[AccountInfo],
        reward_index: u8,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let winner_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let vault_info = next_account_info(account_info_iter)?;
        let vault_token_info = next_account_info(account_info_iter)?;
        let winner_token_info = next_account_info(account_info_iter)?;
        let mint_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;
        let token_program_info = next_account_info(account_info_iter)?;
        let ata_program_info = next_account_info(account_info_iter)?;

        check_signer(winner_info, "Winner")?;
        check_token_program(token_program_info)?;
        let mut raffle = load_raffle(raffle_info, program_id)?;
        check_vault(&raffle, vault_info)?;

        let state = raffle.lifecycle(unix_now()?, None, true);
        let (reward_mint, amount) = raffle
            .record_redemption(reward_index, winner_info.key)
            .map_err(|e| reject(e, Some(state)))?;
        if reward_mint != *mint_info.key {
            msg!("Reward is paid in {}", reward_mint);
            return Err(RaffleError::BadMint.into());
        }

        let vault_token = load_vault_token(&raffle, vault_token_info, &reward_mint)?;
        if vault_token.amount < amount {
            msg!("Vault holds {} of the reward, owes {}", vault_token.amount, amount);
            return Err(reject(RaffleError::VaultBalanceMismatch, None));
        }

        escrow::ensure_associated_token_account(
            winner_info,
            winner_token_info,
            winner_info,
            mint_info,
            system_program_info,
            token_program_info,
            ata_program_info,
        )?;
        escrow::withdraw(
            token_program_info,
            vault_token_info,
            winner_token_info,
            vault_info,
            program_id,
            raffle_info.key,
            raffle.nonce,
            amount,
        )?;

        raffle.pack(&mut raffle_info.data.borrow_mut())?;

        msg!("Reward {} redeemed by {}", reward_index, winner_info.key);
        Ok(())
    }

    fn process_remove_raffle_from_master(
        accounts: &[AccountInfo],
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner_info = next_account_info(account_info_iter)?;
        let master_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;

        check_signer(owner_info, "Raffle owner")?;
        let mut master = load_master_raffle(master_info, program_id)?;
        let raffle = load_raffle(raffle_info, program_id)?;
        check_raffle_owner(&raffle, owner_info)?;

        let state = raffle.lifecycle(unix_now()?, None, master.is_member(raffle_info.key));
        master
            .remove_raffle(&raffle)
            .map_err(|e| reject(e, Some(state)))?;

        master.pack(&mut master_info.data.borrow_mut())?;

        msg!(
            "Raffle {} removed from {}, {} raffles remain",
            raffle_info.key,
            master_info.key,
            master.raffles.len()
        );
        Ok(())
    }

    fn process_update_rng_binding(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner_info = next_account_info(account_info_iter)?;
        let master_info = next_account_info(account_info_iter)?;
        let rng_state_info = next_account_info(account_info_iter)?;
        let oracle_info = next_account_info(account_info_iter)?;
        let vrf_info = next_account_info(account_info_iter)?;
        let rng_bot_info = next_account_info(account_info_iter)?;

        check_signer(owner_info, "Master raffle owner")?;
        let mut master = load_master_raffle(master_info, program_id)?;
        if master.owner != *owner_info.key {
            return Err(reject(RaffleError::NotMasterOwner, None));
        }
        let rng_state = load_rng_state(rng_state_info, program_id, master_info.key)?;

        let vrf_account = vrf::load_vrf_account(vrf_info, oracle_info.key)?;
        if vrf_account.authority != *rng_state_info.key {
            msg!("VRF authority must be the randomness state {}", rng_state_info.key);
            return Err(RaffleError::BadVrfAccount.into());
        }

        master.rebind_rng(RngBinding {
            oracle: *oracle_info.key,
            vrf_account: *vrf_info.key,
            rng_bot: *rng_bot_info.key,
        });
        // Nothing from the previous binding is in flight anymore
        let reset = RngState {
            discriminator: RNG_STATE_DISCRIMINATOR,
            master_raffle: *master_info.key,
            vrf_account: *vrf_info.key,
            bump: rng_state.bump,
            ..RngState::default()
        };

        RngState::pack(reset, &mut rng_state_info.data.borrow_mut())?;
        master.pack(&mut master_info.data.borrow_mut())?;

        // Member raffles passed after the fixed accounts pick up the new bot now,
        // the rest on their next draw
        for raffle_info in account_info_iter {
            let mut raffle = load_raffle(raffle_info, program_id)?;
            if raffle.master_raffle != *master_info.key || !master.is_member(raffle_info.key) {
                return Err(reject(RaffleError::RaffleNotMember, None));
            }
            if master.sync_rng_bot(&mut raffle).map_err(|e| reject(e, None))? {
                raffle.pack(&mut raffle_info.data.borrow_mut())?;
            }
        }

        msg!(
            "Master raffle {} bound to oracle {}, vrf {}, bot {}",
            master_info.key,
            oracle_info.key,
            vrf_info.key,
            rng_bot_info.key
        );
        Ok(())
    }

    fn process_close_raffle(accounts: &[AccountInfo], program_id: &Pubkey) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let owner_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let master_info = next_account_info(account_info_iter)?;

        check_signer(owner_info, "Raffle owner")?;
        let raffle = load_raffle(raffle_info, program_id)?;
        check_raffle_owner(&raffle, owner_info)?;
        if *master_info.key != raffle.master_raffle {
            msg!("Master raffle does not match the raffle");
            return Err(RaffleError::AccountMismatch.into());
        }
        let master = load_master_raffle(master_info, program_id)?;

        let is_member = master.is_member(raffle_info.key);
        let state = raffle.lifecycle(unix_now()?, None, is_member);
        if is_member {
            return Err(reject(RaffleError::RaffleStillMember, Some(state)));
        }
        if !raffle.is_cleared() {
            return Err(reject(RaffleError::RaffleNotCleared, Some(state)));
        }

        let lamports = raffle_info.lamports();
        **owner_info.lamports.borrow_mut() = owner_info
            .lamports()
            .checked_add(lamports)
            .ok_or(RaffleError::MathOverflow)?;
        **raffle_info.lamports.borrow_mut() = 0;
        raffle_info.data.borrow_mut().fill(0);

        msg!("Raffle {} closed, {} lamports returned", raffle_info.key, lamports);
        Ok(())
    }
}
