// Raffle Registry Program - Constants

/// Size of every fixed name field, in bytes
pub const MAX_NAME_LENGTH: usize = 64;

/// Upper bound on the raffle slots a master raffle can index
pub const MAX_MASTER_RAFFLE_INDEXES: u16 = 5000;

/// Longest a raffle may run once started: 3 years, in seconds
pub const MAX_RAFFLE_LENGTH: u64 = 94_670_856;

/// Fee balance (0.1 wrapped SOL) the requester must hold before asking the oracle for randomness
pub const MIN_FEE_BALANCE: u64 = 100_000_000;

/// Seed prefix of the per-master randomness state PDA
pub const RNG_STATE_SEED: &[u8] = b"rng-state";

/// Account discriminators
pub const MASTER_RAFFLE_DISCRIMINATOR: [u8; 8] = *b"mstrrffl";
pub const RAFFLE_DISCRIMINATOR: [u8; 8] = *b"raffle\0\0";
pub const RNG_STATE_DISCRIMINATOR: [u8; 8] = *b"rngstate";

/// Domain separation tags for winner selection
pub const DRAW_DOMAIN: &[u8] = b"raffle-draw";
pub const SOLO_REWARD_DOMAIN: &[u8] = b"solo-reward";
