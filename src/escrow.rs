// Raffle Registry Program - Escrow vault ("gatekeeper") derivation and custody
use solana_program::{
    account_info::AccountInfo,
    entrypoint::ProgramResult,
    msg,
    program::{invoke, invoke_signed},
    program_error::ProgramError,
    program_pack::Pack,
    pubkey::Pubkey,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use spl_token::state::Account as TokenAccount;

use crate::raffle_error::RaffleError;

/// Derive the vault of a raffle. The vault has no private key; only this program signs for it.
pub fn derive_vault(program_id: &Pubkey, raffle: &Pubkey) -> Result<(Pubkey, u8), RaffleError> {
    Pubkey::try_find_program_address(&[raffle.as_ref()], program_id)
        .ok_or(RaffleError::VaultDerivationExhausted)
}

/// Check a stored vault against its raffle and nonce
pub fn verify_vault(
    program_id: &Pubkey,
    raffle: &Pubkey,
    vault: &Pubkey,
    nonce: u8,
) -> Result<(), RaffleError> {
    let expected = Pubkey::create_program_address(&[raffle.as_ref(), &[nonce]], program_id)
        .map_err(|_| RaffleError::BadVaultNonce)?;
    if expected != *vault {
        return Err(RaffleError::BadVaultNonce);
    }
    Ok(())
}

/// Token account holding one asset for the vault
pub fn vault_asset_address(vault: &Pubkey, mint: &Pubkey) -> Pubkey {
    get_associated_token_address(vault, mint)
}

/// Create the vault's token account for `mint` unless it already exists
pub fn provision_vault_for_asset<'a>(
    payer_info: &AccountInfo<'a>,
    vault_token_info: &AccountInfo<'a>,
    vault_info: &AccountInfo<'a>,
    mint_info: &AccountInfo<'a>,
    system_program_info: &AccountInfo<'a>,
    token_program_info: &AccountInfo<'a>,
    ata_program_info: &AccountInfo<'a>,
) -> ProgramResult {
    ensure_associated_token_account(
        payer_info,
        vault_token_info,
        vault_info,
        mint_info,
        system_program_info,
        token_program_info,
        ata_program_info,
    )
}

/// Create `wallet`'s associated token account for `mint` if absent. An existing account is not an error.
pub fn ensure_associated_token_account<'a>(
    payer_info: &AccountInfo<'a>,
    token_account_info: &AccountInfo<'a>,
    wallet_info: &AccountInfo<'a>,
    mint_info: &AccountInfo<'a>,
    system_program_info: &AccountInfo<'a>,
    token_program_info: &AccountInfo<'a>,
    ata_program_info: &AccountInfo<'a>,
) -> ProgramResult {
    if *token_account_info.key != get_associated_token_address(wallet_info.key, mint_info.key) {
        msg!(
            "{} is not the associated token account of {} for mint {}",
            token_account_info.key,
            wallet_info.key,
            mint_info.key
        );
        return Err(RaffleError::AccountMismatch.into());
    }
    if token_account_info.owner == &spl_token::id() && !token_account_info.data_is_empty() {
        return Ok(());
    }
    if *token_program_info.key != spl_token::id()
        || *ata_program_info.key != spl_associated_token_account::id()
    {
        msg!("Unexpected token or associated token account program");
        return Err(ProgramError::IncorrectProgramId);
    }

    invoke(
        &create_associated_token_account_idempotent(
            payer_info.key,
            wallet_info.key,
            mint_info.key,
            &spl_token::id(),
        ),
        &[
            payer_info.clone(),
            token_account_info.clone(),
            wallet_info.clone(),
            mint_info.clone(),
            system_program_info.clone(),
            token_program_info.clone(),
            ata_program_info.clone(),
        ],
    )?;
    msg!("Created token account {} for {}", token_account_info.key, wallet_info.key);
    Ok(())
}

/// Unpack a token account, requiring the given owner and mint
pub fn check_token_account(
    token_info: &AccountInfo,
    owner: &Pubkey,
    mint: &Pubkey,
) -> Result<TokenAccount, ProgramError> {
    if token_info.owner != &spl_token::id() {
        msg!("Token account {} is not owned by the token program", token_info.key);
        return Err(ProgramError::IncorrectProgramId);
    }
    let account = TokenAccount::unpack(&token_info.data.borrow())?;
    if account.mint != *mint {
        msg!("Token account {} holds mint {}, expected {}", token_info.key, account.mint, mint);
        return Err(RaffleError::BadMint.into());
    }
    if account.owner != *owner {
        msg!("Token account {} is not owned by {}", token_info.key, owner);
        return Err(RaffleError::AccountMismatch.into());
    }
    Ok(account)
}

/// Move tokens into the vault, signed by the depositor
pub fn deposit<'a>(
    token_program_info: &AccountInfo<'a>,
    source_info: &AccountInfo<'a>,
    vault_token_info: &AccountInfo<'a>,
    authority_info: &AccountInfo<'a>,
    amount: u64,
) -> ProgramResult {
    let ix = spl_token::instruction::transfer(
        token_program_info.key,
        source_info.key,
        vault_token_info.key,
        authority_info.key,
        &[],
        amount,
    )?;
    invoke(
        &ix,
        &[
            source_info.clone(),
            vault_token_info.clone(),
            authority_info.clone(),
            token_program_info.clone(),
        ],
    )
}

/// Move tokens out of the vault. Only this program can produce the vault signature.
#[allow(clippy::too_many_arguments)]
pub fn withdraw<'a>(
    token_program_info: &AccountInfo<'a>,
    vault_token_info: &AccountInfo<'a>,
    destination_info: &AccountInfo<'a>,
    vault_info: &AccountInfo<'a>,
    program_id: &Pubkey,
    raffle: &Pubkey,
    nonce: u8,
    amount: u64,
) -> ProgramResult {
    verify_vault(program_id, raffle, vault_info.key, nonce)?;

    let ix = spl_token::instruction::transfer(
        token_program_info.key,
        vault_token_info.key,
        destination_info.key,
        vault_info.key,
        &[],
        amount,
    )?;
    invoke_signed(
        &ix,
        &[
            vault_token_info.clone(),
            destination_info.clone(),
            vault_info.clone(),
            token_program_info.clone(),
        ],
        &[&[raffle.as_ref(), &[nonce]]],
    )
}
