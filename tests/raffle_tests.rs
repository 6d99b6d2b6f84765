use anchor_lang::Discriminator;
use solana_program::{
    account_info::AccountInfo, entrypoint::ProgramResult, instruction::InstructionError,
    program_error::ProgramError, program_option::COption, program_pack::Pack,
};
use solana_program_test::*;
use solana_sdk::{
    account::{Account, AccountSharedData},
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction, system_program,
    sysvar::{clock::Clock, rent::Rent},
    transaction::{Transaction, TransactionError},
};
use spl_associated_token_account::get_associated_token_address;
use spl_token::state::{Account as TokenAccount, AccountState, Mint};
use switchboard_v2::{VrfAccountData, VrfRequestRandomness, VrfStatus, PERMISSION_SEED, STATE_SEED};

use raffle_registry::{
    escrow::{derive_vault, vault_asset_address},
    process_instruction,
    raffle_error::RaffleError,
    raffle_instruction::{self as raffle_ix, OracleQueueKeys},
    raffle_state::{MasterRaffle, Raffle, RngState},
    utils::{find_oracle_permission_address, find_oracle_state_address, find_rng_state_address},
    vrf::VRF_ACCOUNT_LEN,
};

const SOL: u64 = 1_000_000_000;

// Stand-in for the oracle: accepts a request signed by the VRF authority and marks it pending
fn stub_oracle(program_id: &Pubkey, accounts: &[AccountInfo], data: &[u8]) -> ProgramResult {
    if data.len() != 10 || data[..8] != VrfRequestRandomness::discriminator() {
        return Err(ProgramError::InvalidInstructionData);
    }
    let (permission_bump, state_bump) = (data[8], data[9]);
    if !accounts[0].is_signer || !accounts[8].is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }
    let permission = Pubkey::create_program_address(
        &[
            PERMISSION_SEED,
            accounts[3].key.as_ref(),
            accounts[2].key.as_ref(),
            accounts[1].key.as_ref(),
            &[permission_bump],
        ],
        program_id,
    )?;
    let program_state = Pubkey::create_program_address(&[STATE_SEED, &[state_bump]], program_id)?;
    if permission != *accounts[5].key || program_state != *accounts[10].key {
        return Err(ProgramError::InvalidSeeds);
    }

    let mut vrf_data = accounts[1].try_borrow_mut_data()?;
    let vrf: &mut VrfAccountData = bytemuck::from_bytes_mut(&mut vrf_data[8..VRF_ACCOUNT_LEN]);
    let authority = vrf.authority;
    if authority != *accounts[0].key {
        return Err(ProgramError::InvalidArgument);
    }
    vrf.status = VrfStatus::StatusRequesting;
    vrf.counter = vrf.counter + 1;
    vrf.current_round.result = [0u8; 32];
    Ok(())
}

fn clone_keypair(keypair: &Keypair) -> Keypair {
    Keypair::from_bytes(&keypair.to_bytes()).unwrap()
}

struct TestEnv {
    context: ProgramTestContext,
    program_id: Pubkey,
    oracle_id: Pubkey,
    owner: Keypair,
    bot: Keypair,
    buyers: Vec<Keypair>,
    master: Keypair,
    vrf: Pubkey,
    spare_vrf: Pubkey,
    queue: OracleQueueKeys,
    payment_mint: Pubkey,
    reward_mint: Pubkey,
    start_time: i64,
}

fn funded_wallet() -> Account {
    Account {
        lamports: 10 * SOL,
        data: vec![],
        owner: system_program::id(),
        executable: false,
        rent_epoch: 0,
    }
}

fn mint_account(authority: &Pubkey, supply: u64) -> Account {
    let mut data = vec![0u8; Mint::LEN];
    Mint::pack(
        Mint {
            mint_authority: COption::Some(*authority),
            supply,
            decimals: 0,
            is_initialized: true,
            freeze_authority: COption::None,
        },
        &mut data,
    )
    .unwrap();
    Account {
        lamports: Rent::default().minimum_balance(Mint::LEN),
        data,
        owner: spl_token::id(),
        executable: false,
        rent_epoch: 0,
    }
}

fn token_account(mint: &Pubkey, owner: &Pubkey, amount: u64, native: bool) -> Account {
    let rent = Rent::default().minimum_balance(TokenAccount::LEN);
    let mut data = vec![0u8; TokenAccount::LEN];
    TokenAccount::pack(
        TokenAccount {
            mint: *mint,
            owner: *owner,
            amount,
            delegate: COption::None,
            state: AccountState::Initialized,
            is_native: if native { COption::Some(rent) } else { COption::None },
            delegated_amount: 0,
            close_authority: COption::None,
        },
        &mut data,
    )
    .unwrap();
    Account {
        lamports: if native { rent + amount } else { rent },
        data,
        owner: spl_token::id(),
        executable: false,
        rent_epoch: 0,
    }
}

fn vrf_account(oracle_id: &Pubkey, authority: &Pubkey, queue: &OracleQueueKeys) -> Account {
    let mut vrf = VrfAccountData::default();
    vrf.status = VrfStatus::StatusNone;
    vrf.authority = *authority;
    vrf.oracle_queue = queue.oracle_queue;
    vrf.escrow = queue.escrow;
    vrf.batch_size = 1;
    let mut data = VrfAccountData::discriminator().to_vec();
    data.extend_from_slice(bytemuck::bytes_of(&vrf));
    Account {
        lamports: Rent::default().minimum_balance(VRF_ACCOUNT_LEN),
        data,
        owner: *oracle_id,
        executable: false,
        rent_epoch: 0,
    }
}

fn permission_account(oracle_id: &Pubkey) -> Account {
    Account {
        lamports: SOL,
        data: vec![1u8; 8],
        owner: *oracle_id,
        executable: false,
        rent_epoch: 0,
    }
}

async fn setup(fee_balance: u64) -> TestEnv {
    let program_id = Pubkey::new_unique();
    let oracle_id = Pubkey::new_unique();

    let mut program_test = ProgramTest::new(
        "raffle_registry",
        program_id,
        processor!(process_instruction),
    );
    program_test.add_program("stub_oracle", oracle_id, processor!(stub_oracle));

    let owner = Keypair::new();
    let bot = Keypair::new();
    let buyers: Vec<Keypair> = (0..3).map(|_| Keypair::new()).collect();
    let master = Keypair::new();
    for wallet in [&owner, &bot].into_iter().chain(buyers.iter()) {
        program_test.add_account(wallet.pubkey(), funded_wallet());
    }

    let queue = OracleQueueKeys {
        oracle_queue: Pubkey::new_unique(),
        queue_authority: Pubkey::new_unique(),
        data_buffer: Pubkey::new_unique(),
        escrow: Pubkey::new_unique(),
    };
    let (rng_state, _) = find_rng_state_address(&program_id, &master.pubkey());
    let vrf = Pubkey::new_unique();
    let spare_vrf = Pubkey::new_unique();
    for key in [vrf, spare_vrf] {
        program_test.add_account(key, vrf_account(&oracle_id, &rng_state, &queue));
        let (permission, _) =
            find_oracle_permission_address(&oracle_id, &queue.queue_authority, &queue.oracle_queue, &key);
        program_test.add_account(permission, permission_account(&oracle_id));
    }

    // the oracle's escrow is wrapped SOL held by its program state
    let native_mint = spl_token::native_mint::id();
    let (program_state, _) = find_oracle_state_address(&oracle_id);
    program_test.add_account(
        queue.escrow,
        token_account(&native_mint, &program_state, 0, true),
    );
    program_test.add_account(
        get_associated_token_address(&bot.pubkey(), &native_mint),
        token_account(&native_mint, &bot.pubkey(), fee_balance, true),
    );

    let payment_mint = Pubkey::new_unique();
    let reward_mint = Pubkey::new_unique();
    program_test.add_account(payment_mint, mint_account(&owner.pubkey(), 3_000));
    program_test.add_account(reward_mint, mint_account(&owner.pubkey(), 10));
    for buyer in &buyers {
        program_test.add_account(
            get_associated_token_address(&buyer.pubkey(), &payment_mint),
            token_account(&payment_mint, &buyer.pubkey(), 1_000, false),
        );
    }
    program_test.add_account(
        get_associated_token_address(&owner.pubkey(), &reward_mint),
        token_account(&reward_mint, &owner.pubkey(), 10, false),
    );

    let mut context = program_test.start_with_context().await;
    let clock: Clock = context.banks_client.get_sysvar().await.unwrap();

    TestEnv {
        context,
        program_id,
        oracle_id,
        owner,
        bot,
        buyers,
        master,
        vrf,
        spare_vrf,
        queue,
        payment_mint,
        reward_mint,
        start_time: clock.unix_timestamp,
    }
}

async fn process(
    context: &mut ProgramTestContext,
    instructions: &[Instruction],
    signers: &[&Keypair],
) -> Result<(), BanksClientError> {
    let blockhash = context
        .banks_client
        .get_new_latest_blockhash(&context.last_blockhash)
        .await
        .unwrap();
    context.last_blockhash = blockhash;
    let mut transaction = Transaction::new_with_payer(instructions, Some(&context.payer.pubkey()));
    let mut all_signers: Vec<&dyn Signer> = vec![&context.payer];
    all_signers.extend(signers.iter().map(|k| *k as &dyn Signer));
    transaction.sign(&all_signers, blockhash);
    context.banks_client.process_transaction(transaction).await
}

fn assert_raffle_error(result: Result<(), BanksClientError>, error: RaffleError) {
    assert_eq!(
        result.unwrap_err().unwrap(),
        TransactionError::InstructionError(0, InstructionError::Custom(error as u32))
    );
}

async fn set_time(context: &mut ProgramTestContext, unix_timestamp: i64) {
    let mut clock: Clock = context.banks_client.get_sysvar().await.unwrap();
    clock.unix_timestamp = unix_timestamp;
    context.set_sysvar(&clock);
}

async fn account_data(context: &mut ProgramTestContext, key: &Pubkey) -> Vec<u8> {
    context
        .banks_client
        .get_account(*key)
        .await
        .unwrap()
        .unwrap()
        .data
}

async fn load_raffle(env: &mut TestEnv, raffle: &Pubkey) -> Raffle {
    Raffle::unpack(&account_data(&mut env.context, raffle).await).unwrap()
}

async fn load_master(env: &mut TestEnv) -> MasterRaffle {
    let key = env.master.pubkey();
    MasterRaffle::unpack(&account_data(&mut env.context, &key).await).unwrap()
}

async fn load_rng_state(env: &mut TestEnv) -> RngState {
    let (key, _) = find_rng_state_address(&env.program_id, &env.master.pubkey());
    RngState::unpack(&account_data(&mut env.context, &key).await).unwrap()
}

async fn token_balance(env: &mut TestEnv, key: &Pubkey) -> u64 {
    TokenAccount::unpack(&account_data(&mut env.context, key).await)
        .unwrap()
        .amount
}

async fn create_master(env: &mut TestEnv, max_raffles: u16) {
    let space = MasterRaffle::space(max_raffles);
    let rent = env.context.banks_client.get_rent().await.unwrap();
    let instructions = [
        system_instruction::create_account(
            &env.context.payer.pubkey(),
            &env.master.pubkey(),
            rent.minimum_balance(space),
            space as u64,
            &env.program_id,
        ),
        raffle_ix::create_master_raffle(
            &env.program_id,
            &env.owner.pubkey(),
            &env.master.pubkey(),
            &env.oracle_id,
            &env.vrf,
            &env.bot.pubkey(),
            "Main Street Raffles",
            max_raffles,
        )
        .unwrap(),
    ];
    let owner = clone_keypair(&env.owner);
    let master = clone_keypair(&env.master);
    process(&mut env.context, &instructions, &[&owner, &master])
        .await
        .unwrap();
}

async fn create_raffle(
    env: &mut TestEnv,
    max_tickets_per_holder: u8,
    payment_option_count: u8,
    reward_count: u8,
    max_holder_count: u16,
) -> Pubkey {
    let raffle = Keypair::new();
    let space = Raffle::space(payment_option_count, reward_count, max_holder_count);
    let rent = env.context.banks_client.get_rent().await.unwrap();
    let instructions = [
        system_instruction::create_account(
            &env.context.payer.pubkey(),
            &raffle.pubkey(),
            rent.minimum_balance(space),
            space as u64,
            &env.program_id,
        ),
        raffle_ix::create_raffle(
            &env.program_id,
            &env.owner.pubkey(),
            &env.master.pubkey(),
            &raffle.pubkey(),
            "Spring Draw",
            max_tickets_per_holder,
            payment_option_count,
            reward_count,
            max_holder_count,
        )
        .unwrap(),
    ];
    let owner = clone_keypair(&env.owner);
    process(&mut env.context, &instructions, &[&owner, &raffle])
        .await
        .unwrap();
    raffle.pubkey()
}

async fn owner_sends(env: &mut TestEnv, instruction: Instruction) -> Result<(), BanksClientError> {
    let owner = clone_keypair(&env.owner);
    process(&mut env.context, &[instruction], &[&owner]).await
}

async fn buy(
    env: &mut TestEnv,
    buyer: usize,
    raffle: &Pubkey,
    payment_option_index: u8,
    units: u8,
) -> Result<(), BanksClientError> {
    let buyer = clone_keypair(&env.buyers[buyer]);
    let instruction = raffle_ix::buy_tickets(
        &env.program_id,
        &buyer.pubkey(),
        raffle,
        &env.payment_mint,
        payment_option_index,
        units,
    )
    .unwrap();
    process(&mut env.context, &[instruction], &[&buyer]).await
}

async fn request_rng(env: &mut TestEnv, requester: &Keypair) -> Result<(), BanksClientError> {
    let instruction = raffle_ix::request_rng(
        &env.program_id,
        &requester.pubkey(),
        &env.master.pubkey(),
        &env.oracle_id,
        &env.vrf,
        &env.queue,
    )
    .unwrap();
    process(&mut env.context, &[instruction], &[requester]).await
}

async fn pick_winner_as(
    env: &mut TestEnv,
    raffle: &Pubkey,
    signer: &Keypair,
) -> Result<(), BanksClientError> {
    let instruction = raffle_ix::pick_winner(
        &env.program_id,
        &signer.pubkey(),
        &env.master.pubkey(),
        raffle,
        &env.vrf,
    )
    .unwrap();
    process(&mut env.context, &[instruction], &[signer]).await
}

async fn pick_winner(env: &mut TestEnv, raffle: &Pubkey) -> Result<(), BanksClientError> {
    let bot = clone_keypair(&env.bot);
    pick_winner_as(env, raffle, &bot).await
}

async fn rebind(
    env: &mut TestEnv,
    signer: &Keypair,
    vrf: &Pubkey,
    rng_bot: &Pubkey,
    member_raffles: &[Pubkey],
) -> Result<(), BanksClientError> {
    let instruction = raffle_ix::update_master_raffle_rng_binding(
        &env.program_id,
        &signer.pubkey(),
        &env.master.pubkey(),
        &env.oracle_id,
        vrf,
        rng_bot,
        member_raffles,
    )
    .unwrap();
    process(&mut env.context, &[instruction], &[signer]).await
}

/// Plays the oracle by writing a round status and result into the VRF account
async fn set_vrf_round(env: &mut TestEnv, status: VrfStatus, result: [u8; 32]) {
    let vrf_key = env.vrf;
    let mut data = account_data(&mut env.context, &vrf_key).await;
    {
        let vrf: &mut VrfAccountData = bytemuck::from_bytes_mut(&mut data[8..VRF_ACCOUNT_LEN]);
        vrf.status = status;
        vrf.current_round.result = result;
    }
    env.context.set_account(
        &vrf_key,
        &AccountSharedData::from(Account {
            lamports: Rent::default().minimum_balance(VRF_ACCOUNT_LEN),
            data,
            owner: env.oracle_id,
            executable: false,
            rent_epoch: 0,
        }),
    );
}

async fn fulfill_randomness(env: &mut TestEnv, result: [u8; 32]) {
    set_vrf_round(env, VrfStatus::StatusCallbackSuccess, result).await;
}

/// Raffle with two options in one mint (10 -> 1 ticket, 90 -> 10 tickets) and a two reward basket
async fn started_raffle(env: &mut TestEnv, end_offset: i64) -> Pubkey {
    let raffle = create_raffle(env, 20, 2, 2, 8).await;
    let (program_id, owner, mint, reward_mint) = (
        env.program_id,
        env.owner.pubkey(),
        env.payment_mint,
        env.reward_mint,
    );

    for (name, price, tickets) in [("single", 10, 1), ("bundle", 90, 10)] {
        let ix = raffle_ix::load_payment_option(&program_id, &owner, &raffle, &mint, name, price, tickets)
            .unwrap();
        owner_sends(env, ix).await.unwrap();
    }
    let basket = Pubkey::new_unique();
    for (name, amount) in [("gold", 3), ("silver", 2)] {
        let ix = raffle_ix::load_reward(&program_id, &owner, &raffle, &reward_mint, name, &basket, amount)
            .unwrap();
        owner_sends(env, ix).await.unwrap();
    }

    set_time(&mut env.context, env.start_time).await;
    let end_date = (env.start_time + end_offset) as u64;
    let ix = raffle_ix::start_raffle(&program_id, &owner, &raffle, end_date).unwrap();
    owner_sends(env, ix).await.unwrap();
    raffle
}

#[tokio::test]
async fn test_create_master_and_raffle() {
    let mut env = setup(SOL / 2).await;
    create_master(&mut env, 4).await;

    let master = load_master(&mut env).await;
    assert_eq!(master.name(), "Main Street Raffles");
    assert_eq!(master.owner, env.owner.pubkey());
    assert_eq!(master.rng_bot, env.bot.pubkey());
    assert_eq!(master.max_raffles, 4);
    assert!(master.raffles.is_empty());

    let rng_state = load_rng_state(&mut env).await;
    assert_eq!(rng_state.vrf_account, env.vrf);
    assert!(!rng_state.request_in_flight);

    let raffle_key = create_raffle(&mut env, 20, 2, 1, 8).await;
    let raffle = load_raffle(&mut env, &raffle_key).await;
    let (vault, nonce) = derive_vault(&env.program_id, &raffle_key).unwrap();
    assert_eq!(raffle.vault, vault);
    assert_eq!(raffle.nonce, nonce);
    assert_eq!(raffle.rng_bot, env.bot.pubkey());
    assert_eq!(raffle.start_date, 0);
    assert_eq!(load_master(&mut env).await.raffles, vec![raffle_key]);

    // cannot start before everything is loaded
    let ix = raffle_ix::start_raffle(&env.program_id, &env.owner.pubkey(), &raffle_key, u64::MAX)
        .unwrap();
    assert_raffle_error(
        owner_sends(&mut env, ix).await,
        RaffleError::IncompleteConfiguration,
    );
}

#[tokio::test]
async fn test_full_raffle_lifecycle() {
    let mut env = setup(SOL / 2).await;
    create_master(&mut env, 4).await;
    let raffle_key = started_raffle(&mut env, 1_000).await;
    let (vault, _) = derive_vault(&env.program_id, &raffle_key).unwrap();
    let payment_vault = vault_asset_address(&vault, &env.payment_mint);
    let reward_vault = vault_asset_address(&vault, &env.reward_mint);
    assert_eq!(token_balance(&mut env, &reward_vault).await, 5);

    // one unit at each price, then three singles from another holder
    buy(&mut env, 0, &raffle_key, 0, 1).await.unwrap();
    buy(&mut env, 0, &raffle_key, 1, 1).await.unwrap();
    buy(&mut env, 1, &raffle_key, 0, 3).await.unwrap();

    let raffle = load_raffle(&mut env, &raffle_key).await;
    assert_eq!(raffle.holder_ticket_count(&env.buyers[0].pubkey()), 11);
    assert_eq!(raffle.holder_ticket_count(&env.buyers[1].pubkey()), 3);
    assert_eq!(raffle.payment_options[0].payment_tally, 40);
    assert_eq!(raffle.payment_options[1].payment_tally, 90);
    assert_eq!(token_balance(&mut env, &payment_vault).await, 130);
    assert!(raffle.invariants_hold());

    assert_raffle_error(
        buy(&mut env, 0, &raffle_key, 1, 1).await,
        RaffleError::BuyingTooMany,
    );
    assert_raffle_error(pick_winner(&mut env, &raffle_key).await, RaffleError::RaffleNotEnded);

    set_time(&mut env.context, env.start_time + 1_010).await;
    assert_raffle_error(buy(&mut env, 2, &raffle_key, 0, 1).await, RaffleError::RaffleEnded);

    // randomness: requested after close, fulfilled by the oracle, then consumed
    let bot = clone_keypair(&env.bot);
    assert_raffle_error(pick_winner(&mut env, &raffle_key).await, RaffleError::RandomnessNotFulfilled);
    request_rng(&mut env, &bot).await.unwrap();
    let rng_state = load_rng_state(&mut env).await;
    assert!(rng_state.request_in_flight);
    assert_eq!(rng_state.request_counter, 1);
    assert_raffle_error(request_rng(&mut env, &bot).await, RaffleError::RngRequestInFlight);
    assert_raffle_error(pick_winner(&mut env, &raffle_key).await, RaffleError::RandomnessNotFulfilled);

    fulfill_randomness(&mut env, [77u8; 32]).await;
    pick_winner(&mut env, &raffle_key).await.unwrap();
    assert_raffle_error(pick_winner(&mut env, &raffle_key).await, RaffleError::WinnersAlreadyPicked);

    let raffle = load_raffle(&mut env, &raffle_key).await;
    let winner = raffle.rewards[0].winner.unwrap();
    assert_eq!(raffle.rewards[1].winner, Some(winner));
    let winner_index = env
        .buyers
        .iter()
        .position(|b| b.pubkey() == winner)
        .expect("winner must be a ticket holder");
    assert!(winner_index < 2);
    let rng_state = load_rng_state(&mut env).await;
    assert!(!rng_state.request_in_flight);
    assert_eq!(rng_state.last_result, [77u8; 32]);

    // settle
    let ix = raffle_ix::remove_raffle_from_master(
        &env.program_id,
        &env.owner.pubkey(),
        &env.master.pubkey(),
        &raffle_key,
    )
    .unwrap();
    assert_raffle_error(owner_sends(&mut env, ix.clone()).await, RaffleError::RaffleNotCleared);

    let loser = clone_keypair(&env.buyers[1 - winner_index]);
    let ix_loser = raffle_ix::redeem_reward(&env.program_id, &loser.pubkey(), &raffle_key, &env.reward_mint, 0)
        .unwrap();
    assert_raffle_error(
        process(&mut env.context, &[ix_loser], &[&loser]).await,
        RaffleError::NotWinner,
    );

    let winner_kp = clone_keypair(&env.buyers[winner_index]);
    for reward_index in 0..2 {
        let ix = raffle_ix::redeem_reward(
            &env.program_id,
            &winner,
            &raffle_key,
            &env.reward_mint,
            reward_index,
        )
        .unwrap();
        process(&mut env.context, &[ix], &[&winner_kp]).await.unwrap();
    }
    let winner_reward_account = get_associated_token_address(&winner, &env.reward_mint);
    assert_eq!(token_balance(&mut env, &winner_reward_account).await, 5);
    assert_eq!(token_balance(&mut env, &reward_vault).await, 0);

    let cash_out = raffle_ix::cash_out_owner(
        &env.program_id,
        &env.owner.pubkey(),
        &raffle_key,
        &env.payment_mint,
        0,
    )
    .unwrap();
    owner_sends(&mut env, cash_out).await.unwrap();
    let owner_payment_account = get_associated_token_address(&env.owner.pubkey(), &env.payment_mint);
    assert_eq!(token_balance(&mut env, &owner_payment_account).await, 130);
    assert_eq!(token_balance(&mut env, &payment_vault).await, 0);

    let cash_out_again = raffle_ix::cash_out_owner(
        &env.program_id,
        &env.owner.pubkey(),
        &raffle_key,
        &env.payment_mint,
        1,
    )
    .unwrap();
    assert_raffle_error(
        owner_sends(&mut env, cash_out_again).await,
        RaffleError::AlreadyCashedOut,
    );

    let raffle = load_raffle(&mut env, &raffle_key).await;
    assert!(raffle.is_cleared());

    // remove, then destroy
    let close = raffle_ix::close_raffle(
        &env.program_id,
        &env.owner.pubkey(),
        &raffle_key,
        &env.master.pubkey(),
    )
    .unwrap();
    assert_raffle_error(owner_sends(&mut env, close.clone()).await, RaffleError::RaffleStillMember);

    owner_sends(&mut env, ix).await.unwrap();
    assert!(load_master(&mut env).await.raffles.is_empty());

    owner_sends(&mut env, close).await.unwrap();
    assert!(env
        .context
        .banks_client
        .get_account(raffle_key)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_request_rng_needs_funded_fee_vault() {
    let mut env = setup(SOL / 20).await;
    create_master(&mut env, 1).await;

    let bot = clone_keypair(&env.bot);
    assert_raffle_error(request_rng(&mut env, &bot).await, RaffleError::InsufficientFeeBalance);

    // only the owner or the bot may ask
    let stranger = clone_keypair(&env.buyers[0]);
    assert_raffle_error(request_rng(&mut env, &stranger).await, RaffleError::NotRngAuthority);

    // the owner never wrapped SOL
    let owner = clone_keypair(&env.owner);
    assert_raffle_error(request_rng(&mut env, &owner).await, RaffleError::FeeVaultMissing);

    let rng_state = load_rng_state(&mut env).await;
    assert!(!rng_state.request_in_flight);
    assert_eq!(rng_state.request_counter, 0);
}

#[tokio::test]
async fn test_ticket_limits_are_enforced() {
    let mut env = setup(SOL / 2).await;
    create_master(&mut env, 2).await;
    let raffle_key = create_raffle(&mut env, 1, 1, 1, 1).await;
    let (program_id, owner, mint, reward_mint) = (
        env.program_id,
        env.owner.pubkey(),
        env.payment_mint,
        env.reward_mint,
    );

    let too_generous =
        raffle_ix::load_payment_option(&program_id, &owner, &raffle_key, &mint, "pair", 5, 2).unwrap();
    assert_raffle_error(
        owner_sends(&mut env, too_generous).await,
        RaffleError::TooManyTicketsPerPayment,
    );
    let ix = raffle_ix::load_payment_option(&program_id, &owner, &raffle_key, &mint, "single", 5, 1)
        .unwrap();
    owner_sends(&mut env, ix).await.unwrap();

    let greedy = raffle_ix::load_reward(
        &program_id,
        &owner,
        &raffle_key,
        &reward_mint,
        "everything",
        &Pubkey::default(),
        11,
    )
    .unwrap();
    assert_raffle_error(
        owner_sends(&mut env, greedy).await,
        RaffleError::InsufficientRewardBalance,
    );
    let ix = raffle_ix::load_reward(
        &program_id,
        &owner,
        &raffle_key,
        &reward_mint,
        "prize",
        &Pubkey::default(),
        1,
    )
    .unwrap();
    owner_sends(&mut env, ix).await.unwrap();

    set_time(&mut env.context, env.start_time).await;
    let too_far = (env.start_time as u64) + 94_670_857;
    let ix = raffle_ix::start_raffle(&program_id, &owner, &raffle_key, too_far).unwrap();
    assert_raffle_error(owner_sends(&mut env, ix).await, RaffleError::EndDateTooFar);
    let ix = raffle_ix::start_raffle(&program_id, &owner, &raffle_key, (env.start_time + 60) as u64)
        .unwrap();
    owner_sends(&mut env, ix).await.unwrap();

    buy(&mut env, 0, &raffle_key, 0, 1).await.unwrap();
    assert_raffle_error(buy(&mut env, 0, &raffle_key, 0, 1).await, RaffleError::BuyingTooMany);
    assert_raffle_error(buy(&mut env, 1, &raffle_key, 0, 1).await, RaffleError::TooManyHolders);
    assert_raffle_error(buy(&mut env, 2, &raffle_key, 3, 1).await, RaffleError::BadPaymentIndex);

    let raffle = load_raffle(&mut env, &raffle_key).await;
    assert_eq!(raffle.holders.len(), 1);
    assert_eq!(raffle.total_ticket_count(), 1);
    assert_eq!(raffle.payment_options[0].payment_tally, 5);
}

#[tokio::test]
async fn test_unsold_raffle_returns_rewards_to_owner() {
    let mut env = setup(SOL / 2).await;
    create_master(&mut env, 1).await;
    let raffle_key = started_raffle(&mut env, 100).await;

    set_time(&mut env.context, env.start_time + 200).await;
    let bot = clone_keypair(&env.bot);
    request_rng(&mut env, &bot).await.unwrap();
    fulfill_randomness(&mut env, [1u8; 32]).await;
    pick_winner(&mut env, &raffle_key).await.unwrap();

    let owner = clone_keypair(&env.owner);
    let raffle = load_raffle(&mut env, &raffle_key).await;
    assert!(raffle.rewards.iter().all(|r| r.winner == Some(owner.pubkey())));

    let (program_id, reward_mint, payment_mint) = (env.program_id, env.reward_mint, env.payment_mint);
    for reward_index in 0..2 {
        let ix = raffle_ix::redeem_reward(&program_id, &owner.pubkey(), &raffle_key, &reward_mint, reward_index)
            .unwrap();
        owner_sends(&mut env, ix).await.unwrap();
    }
    let ix = raffle_ix::cash_out_owner(&program_id, &owner.pubkey(), &raffle_key, &payment_mint, 1)
        .unwrap();
    owner_sends(&mut env, ix).await.unwrap();

    let owner_reward_account = get_associated_token_address(&owner.pubkey(), &reward_mint);
    assert_eq!(token_balance(&mut env, &owner_reward_account).await, 10);
    assert!(load_raffle(&mut env, &raffle_key).await.is_cleared());

    let ix = raffle_ix::remove_raffle_from_master(
        &program_id,
        &owner.pubkey(),
        &env.master.pubkey(),
        &raffle_key,
    )
    .unwrap();
    owner_sends(&mut env, ix).await.unwrap();
    assert!(load_master(&mut env).await.raffles.is_empty());
}

#[tokio::test]
async fn test_rebinding_resets_rng_state() {
    let mut env = setup(SOL / 2).await;
    create_master(&mut env, 2).await;
    let early = started_raffle(&mut env, 100).await;
    let late = started_raffle(&mut env, 100).await;

    let bot = clone_keypair(&env.bot);
    request_rng(&mut env, &bot).await.unwrap();
    assert!(load_rng_state(&mut env).await.request_in_flight);

    let new_bot = Keypair::new();
    let spare_vrf = env.spare_vrf;
    let stranger = clone_keypair(&env.buyers[0]);
    assert_raffle_error(
        rebind(&mut env, &stranger, &spare_vrf, &new_bot.pubkey(), &[]).await,
        RaffleError::NotMasterOwner,
    );

    // only the raffle passed along is refreshed right away
    let owner = clone_keypair(&env.owner);
    rebind(&mut env, &owner, &spare_vrf, &new_bot.pubkey(), &[late])
        .await
        .unwrap();

    let master = load_master(&mut env).await;
    assert_eq!(master.vrf_account, env.spare_vrf);
    assert_eq!(master.rng_bot, new_bot.pubkey());
    let rng_state = load_rng_state(&mut env).await;
    assert_eq!(rng_state.vrf_account, env.spare_vrf);
    assert!(!rng_state.request_in_flight);
    assert_eq!(rng_state.request_counter, 0);
    assert_eq!(load_raffle(&mut env, &late).await.rng_bot, new_bot.pubkey());
    assert_eq!(load_raffle(&mut env, &early).await.rng_bot, bot.pubkey());

    // the old bot lost its authority, over the master and over raffles still carrying it
    env.vrf = env.spare_vrf;
    assert_raffle_error(request_rng(&mut env, &bot).await, RaffleError::NotRngAuthority);
    assert_raffle_error(
        pick_winner_as(&mut env, &early, &bot).await,
        RaffleError::NotRngAuthority,
    );
    assert_raffle_error(
        pick_winner_as(&mut env, &early, &new_bot).await,
        RaffleError::RaffleNotEnded,
    );

    // the new bot can see a draw through once the raffle closes
    let new_bot_vault = get_associated_token_address(&new_bot.pubkey(), &spl_token::native_mint::id());
    env.context.set_account(
        &new_bot_vault,
        &AccountSharedData::from(token_account(
            &spl_token::native_mint::id(),
            &new_bot.pubkey(),
            SOL / 2,
            true,
        )),
    );
    set_time(&mut env.context, env.start_time + 200).await;
    request_rng(&mut env, &new_bot).await.unwrap();
    fulfill_randomness(&mut env, [3u8; 32]).await;
    pick_winner_as(&mut env, &early, &new_bot).await.unwrap();
    let raffle = load_raffle(&mut env, &early).await;
    assert_eq!(raffle.rng_bot, new_bot.pubkey());
    assert!(raffle.winners_assigned());
}

#[tokio::test]
async fn test_fulfilled_randomness_cannot_be_rerolled() {
    let mut env = setup(SOL / 2).await;
    create_master(&mut env, 1).await;
    let raffle_key = started_raffle(&mut env, 100).await;
    buy(&mut env, 0, &raffle_key, 0, 2).await.unwrap();
    set_time(&mut env.context, env.start_time + 200).await;

    let bot = clone_keypair(&env.bot);
    request_rng(&mut env, &bot).await.unwrap();
    fulfill_randomness(&mut env, [8u8; 32]).await;
    assert_raffle_error(request_rng(&mut env, &bot).await, RaffleError::RngRequestInFlight);
    let owner = clone_keypair(&env.owner);
    assert_raffle_error(request_rng(&mut env, &owner).await, RaffleError::RngRequestInFlight);
    assert_eq!(load_rng_state(&mut env).await.request_counter, 1);

    pick_winner(&mut env, &raffle_key).await.unwrap();
    let raffle = load_raffle(&mut env, &raffle_key).await;
    assert!(raffle
        .rewards
        .iter()
        .all(|r| r.winner == Some(env.buyers[0].pubkey())));

    // consumed, so the next round may be requested
    request_rng(&mut env, &bot).await.unwrap();
    let rng_state = load_rng_state(&mut env).await;
    assert!(rng_state.request_in_flight);
    assert_eq!(rng_state.request_counter, 2);
    assert_eq!(rng_state.last_result, [8u8; 32]);

    // a round the oracle failed to verify leaves nothing to protect, resubmitting is allowed
    set_vrf_round(&mut env, VrfStatus::StatusVerifyFailure, [0u8; 32]).await;
    request_rng(&mut env, &bot).await.unwrap();
    assert_eq!(load_rng_state(&mut env).await.request_counter, 3);
}

#[tokio::test]
async fn test_request_rng_checks_oracle_accounts() {
    let mut env = setup(SOL / 2).await;
    create_master(&mut env, 1).await;
    let bot = clone_keypair(&env.bot);

    // queue and escrow must be the ones the VRF account names
    let queue = env.queue;
    env.queue.oracle_queue = Pubkey::new_unique();
    assert_raffle_error(request_rng(&mut env, &bot).await, RaffleError::OracleAccountMismatch);
    env.queue = OracleQueueKeys {
        escrow: Pubkey::new_unique(),
        ..queue
    };
    assert_raffle_error(request_rng(&mut env, &bot).await, RaffleError::OracleAccountMismatch);
    env.queue = queue;

    // permission PDA absent, owned by someone else, then empty
    let (permission, _) = find_oracle_permission_address(
        &env.oracle_id,
        &queue.queue_authority,
        &queue.oracle_queue,
        &env.vrf,
    );
    env.context.set_account(&permission, &AccountSharedData::default());
    assert_raffle_error(request_rng(&mut env, &bot).await, RaffleError::MissingOraclePermission);

    let foreign = permission_account(&Pubkey::new_unique());
    env.context.set_account(&permission, &AccountSharedData::from(foreign));
    assert_raffle_error(request_rng(&mut env, &bot).await, RaffleError::MissingOraclePermission);

    let mut empty = permission_account(&env.oracle_id);
    empty.data.clear();
    env.context.set_account(&permission, &AccountSharedData::from(empty));
    assert_raffle_error(request_rng(&mut env, &bot).await, RaffleError::MissingOraclePermission);

    let rng_state = load_rng_state(&mut env).await;
    assert!(!rng_state.request_in_flight);
    assert_eq!(rng_state.request_counter, 0);

    let granted = permission_account(&env.oracle_id);
    env.context.set_account(&permission, &AccountSharedData::from(granted));
    request_rng(&mut env, &bot).await.unwrap();
    assert_eq!(load_rng_state(&mut env).await.request_counter, 1);
}

#[tokio::test]
async fn test_randomness_requested_before_close_is_stale() {
    let mut env = setup(SOL / 2).await;
    create_master(&mut env, 1).await;
    let raffle_key = started_raffle(&mut env, 100).await;
    buy(&mut env, 1, &raffle_key, 0, 1).await.unwrap();

    // asked for while tickets were still on sale
    let bot = clone_keypair(&env.bot);
    request_rng(&mut env, &bot).await.unwrap();
    fulfill_randomness(&mut env, [4u8; 32]).await;
    set_time(&mut env.context, env.start_time + 150).await;
    assert_raffle_error(pick_winner(&mut env, &raffle_key).await, RaffleError::StaleRandomness);
    assert!(!load_raffle(&mut env, &raffle_key).await.winners_assigned());

    // the unused round still blocks the bot, the owner clears it by rebinding
    assert_raffle_error(request_rng(&mut env, &bot).await, RaffleError::RngRequestInFlight);
    let owner = clone_keypair(&env.owner);
    let (vrf, bot_key) = (env.vrf, env.bot.pubkey());
    rebind(&mut env, &owner, &vrf, &bot_key, &[raffle_key])
        .await
        .unwrap();

    request_rng(&mut env, &bot).await.unwrap();
    fulfill_randomness(&mut env, [5u8; 32]).await;
    pick_winner(&mut env, &raffle_key).await.unwrap();
    let raffle = load_raffle(&mut env, &raffle_key).await;
    assert!(raffle
        .rewards
        .iter()
        .all(|r| r.winner == Some(env.buyers[1].pubkey())));
    assert_eq!(load_rng_state(&mut env).await.last_result, [5u8; 32]);
}

#[tokio::test]
async fn test_raffle_needs_tickets_per_holder() {
    let mut env = setup(SOL / 2).await;
    create_master(&mut env, 1).await;

    let raffle = Keypair::new();
    let space = Raffle::space(1, 1, 1);
    let rent = env.context.banks_client.get_rent().await.unwrap();
    let instructions = [
        system_instruction::create_account(
            &env.context.payer.pubkey(),
            &raffle.pubkey(),
            rent.minimum_balance(space),
            space as u64,
            &env.program_id,
        ),
        raffle_ix::create_raffle(
            &env.program_id,
            &env.owner.pubkey(),
            &env.master.pubkey(),
            &raffle.pubkey(),
            "No Tickets",
            0,
            1,
            1,
            1,
        )
        .unwrap(),
    ];
    let owner = clone_keypair(&env.owner);
    let result = process(&mut env.context, &instructions, &[&owner, &raffle]).await;
    assert_eq!(
        result.unwrap_err().unwrap(),
        TransactionError::InstructionError(
            1,
            InstructionError::Custom(RaffleError::NeedTicketsPerHolder as u32)
        )
    );
    assert!(load_master(&mut env).await.raffles.is_empty());
}
