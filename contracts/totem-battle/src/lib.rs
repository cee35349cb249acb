#![no_std]

//! # Totem Battle
//!
//! A two-player confidential card battle. Each player joins with a deck of 6
//! totem cards whose types (Eagle, Bear, Snake) are submitted in encrypted
//! form and live on-chain only as cipher-gateway handles. Each round both
//! players pick a card slot; the contract resolves the clash without ever
//! branching on a card's type.
//!
//! ## Game flow
//! 1. Anyone creates a game (Waiting).
//! 2. Two players join, each submitting 6 encoded card types plus a binding
//!    proof. Types are validated **obliviously**: membership in {0,1,2} is a
//!    confidential OR of three equality tests, and out-of-range submissions
//!    are silently normalized to Eagle via oblivious select — an invalid
//!    deck is indistinguishable from a valid one on-chain.
//! 3. On the second join the game starts (Playing). Each round both players
//!    submit one alive card index; once both have played, the battle
//!    resolves atomically in the second `play_card` call.
//! 4. The game finishes when either side runs out of alive cards. Winner is
//!    the side with strictly more survivors; an exact tie leaves no winner.
//!
//! ## Type hierarchy
//! Eagle (0) beats Snake (2), Bear (1) beats Eagle (0), Snake (2) beats
//! Bear (1). The advantage circuit is built purely from gateway equality,
//! AND/OR, and select operations, so the resolution path is identical
//! regardless of the secret types. Under the default rule both played cards
//! die every round and the type-advantage result is kept only as a
//! confidential per-round result code, decryptable by the two players.
//!
//! ## Registry invariant
//! An address occupies at most one unfinished game at a time; joining a
//! second game while one is open is rejected.

use soroban_sdk::{
    contract, contractclient, contracterror, contractevent, contractimpl, contracttype,
    Address, Bytes, BytesN, Env, Vec,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract Events
// ═══════════════════════════════════════════════════════════════════════════════

#[contractevent]
pub struct EvGameCreated {
    pub game_id: u64,
    pub creator: Address,
}

/// Emitted per join with the slot the player was assigned.
#[contractevent]
pub struct EvPlayerJoined {
    pub game_id: u64,
    pub player: Address,
    pub slot: u32,
}

/// Emitted on the second join, when the game transitions to Playing.
#[contractevent]
pub struct EvGameStarted {
    pub game_id: u64,
}

/// Emitted when a player commits a card for the round. The index is public;
/// the card's type is not.
#[contractevent]
pub struct EvCardPlayed {
    pub game_id: u64,
    pub player: Address,
    pub slot: u32,
    pub card_index: u32,
}

/// Emitted after each battle resolution. `result_handle` references the
/// confidential three-way result code, readable by the two players only.
#[contractevent]
pub struct EvBattleResolved {
    pub game_id: u64,
    pub round: u32,
    pub card1_index: u32,
    pub card2_index: u32,
    pub result_handle: u64,
}

#[contractevent]
pub struct EvGameEnded {
    pub game_id: u64,
    pub winner: u32, // 0 = tie / no winner
}

/// Emitted when the admin force-closes a stuck game.
#[contractevent]
pub struct EvGameClosed {
    pub game_id: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  External trait interfaces
// ═══════════════════════════════════════════════════════════════════════════════

/// Confidential value gateway: ingestion with proof-of-validity, oblivious
/// computation on opaque handles, and capability-based read access.
///
/// Encoded value layout: `masked_value_be8 || mask32` (40 bytes), where
/// `masked_value = value XOR keccak256(mask || "TOTEM_CT_V1")[0..8]`.
/// Batch proof: `keccak256(concat(encoded) || submitter || "TOTEM_CT_PF")`.
///
/// All computing calls authenticate `holder`; when this contract is the
/// holder, Soroban contract-invoker auth satisfies the check.
#[contractclient(name = "GatewayClient")]
pub trait CipherGateway {
    fn ingest_batch(
        env: Env,
        holder: Address,
        submitter: Address,
        encoded: Vec<Bytes>,
        proof: BytesN<32>,
    ) -> Vec<u64>;

    fn ct_constant(env: Env, holder: Address, value: u64) -> u64;
    fn ct_eq(env: Env, holder: Address, a: u64, b: u64) -> u64;
    fn ct_eq_const(env: Env, holder: Address, a: u64, k: u64) -> u64;
    fn ct_and(env: Env, holder: Address, a: u64, b: u64) -> u64;
    fn ct_or(env: Env, holder: Address, a: u64, b: u64) -> u64;
    fn ct_select(env: Env, holder: Address, cond: u64, when_true: u64, when_false: u64) -> u64;

    fn grant_access(env: Env, holder: Address, handle: u64, grantee: Address);
    fn decrypt(env: Env, handle: u64, holder: Address) -> u64;
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum BattleError {
    GameNotFound = 1,
    AlreadyInGame = 2,
    GameFull = 3,
    AlreadyJoined = 4,
    InvalidState = 5,
    NotAPlayer = 6,
    InvalidCardIndex = 7,
    CardDead = 8,
    AlreadyPlayedThisRound = 9,
    InvalidProof = 10,
    InvalidDeckSize = 11,
    InvalidSlot = 12,
    RoundNotResolved = 13,
    GameAlreadyEnded = 14,
    AdminNotSet = 15,
    GatewayNotSet = 16,
    RulesNotSet = 17,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Lifecycle states (compact u32 encoding for storage efficiency)
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) type LifecycleState = u32;

pub const STATE_WAITING: LifecycleState = 1;
pub const STATE_PLAYING: LifecycleState = 2;
pub const STATE_FINISHED: LifecycleState = 3;

// Totem types. Values are what players encrypt; anything outside the range
// is normalized to TOTEM_EAGLE at ingestion.
pub const TOTEM_EAGLE: u64 = 0;
pub const TOTEM_BEAR: u64 = 1;
pub const TOTEM_SNAKE: u64 = 2;

// Confidential round-result codes
pub const RESULT_DRAW: u64 = 0;
pub const RESULT_PLAYER1_WIN: u64 = 1;
pub const RESULT_PLAYER2_WIN: u64 = 2;

// Player slots
pub const PLAYER_1: u32 = 1;
pub const PLAYER_2: u32 = 2;

/// Winner code for a finished game without a winner (exact tie or closure).
pub const WINNER_NONE: u32 = 0;

// ═══════════════════════════════════════════════════════════════════════════════
//  Game state & storage keys
// ═══════════════════════════════════════════════════════════════════════════════

/// One slot of a player's deck. The type is a gateway handle; health and the
/// alive flag are plaintext (the design keeps observable survivorship public
/// while card identities stay confidential).
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Card {
    pub type_handle: u64,
    pub health: u32,
    pub is_alive: bool,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TotemGame {
    pub player1: Option<Address>,
    pub player2: Option<Address>,
    pub players_joined: u32,
    // Decks (empty until the slot's player joins)
    pub cards1: Vec<Card>,
    pub cards2: Vec<Card>,
    pub alive_count1: u32,
    pub alive_count2: u32,
    // Pending-round commitment buffer
    pub played_card1: u32,
    pub played_card2: u32,
    pub has_played1: bool,
    pub has_played2: bool,
    // Rounds
    pub current_round: u32,
    /// One confidential result-code handle per resolved round, readable by
    /// the two players.
    pub round_results: Vec<u64>,
    // State machine
    pub lifecycle_state: u32,
    pub winner: u32,
}

/// Rule/policy variants. All three are fixed per deployment via the
/// constructor (admin-adjustable), not per game.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleConfig {
    /// Apply the one-unfinished-game check at creation too, not only at join.
    pub strict_create: bool,
    /// Asymmetric survivorship: only the loser's card dies on a non-draw.
    /// The default rule kills both played cards every round.
    pub extended_combat: bool,
    /// Break same-type clashes by card health (extended rule only in effect;
    /// healths are equal under the fixed-health deck, so this is dormant
    /// until decks carry varied health).
    pub health_tiebreak: bool,
}

#[contracttype]
#[derive(Clone)]
enum StorageKey {
    Game(u64),
    NextGameId,
    /// Active-game index: address → id of its one unfinished game.
    ActiveGame(Address),
    Admin,
    GatewayAddress,
    Rules,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

pub const DECK_SIZE: u32 = 6;
pub const CARD_HEALTH: u32 = 2;

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// TTL expressed in human-readable time units (30 days)
const TTL_SECONDS: u32 = 30 * 24 * 60 * 60; // 2,592,000 seconds

/// TTL for game storage in ledgers: 30 * 24 * 60 * 60 / 5 = 518,400 ledgers
const GAME_TTL_LEDGERS: u32 = TTL_SECONDS / LEDGER_RATE_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
//  View types
// ═══════════════════════════════════════════════════════════════════════════════

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GameInfo {
    pub state: u32,
    pub round: u32,
    pub joined: u32,
    pub player1: Option<Address>,
    pub player2: Option<Address>,
    pub winner: u32,
}

/// A deck view. `type_handles` are opaque without a gateway decrypt grant,
/// so exposing them to anyone leaks nothing.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlayerCards {
    pub type_handles: Vec<u64>,
    pub healths: Vec<u32>,
    pub alive: Vec<bool>,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct TotemBattleContract;

#[contractimpl]
impl TotemBattleContract {
    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Constructor
    // ───────────────────────────────────────────────────────────────────────────

    pub fn __constructor(env: Env, admin: Address, gateway: Address, rules: RuleConfig) {
        env.storage().instance().set(&StorageKey::Admin, &admin);
        env.storage()
            .instance()
            .set(&StorageKey::GatewayAddress, &gateway);
        env.storage().instance().set(&StorageKey::Rules, &rules);
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Game Registry
    // ───────────────────────────────────────────────────────────────────────────

    /// Create a new game in the Waiting state and return its id. Ids are
    /// allocated monotonically starting at 1.
    pub fn create_game(env: Env, creator: Address) -> Result<u64, BattleError> {
        creator.require_auth();

        let rules = Self::load_rules(&env)?;
        if rules.strict_create && Self::active_game_of(&env, &creator).is_some() {
            return Err(BattleError::AlreadyInGame);
        }

        let game_id: u64 = env
            .storage()
            .instance()
            .get(&StorageKey::NextGameId)
            .unwrap_or(1);
        env.storage()
            .instance()
            .set(&StorageKey::NextGameId, &(game_id + 1));

        let game = TotemGame {
            player1: None,
            player2: None,
            players_joined: 0,
            cards1: Vec::new(&env),
            cards2: Vec::new(&env),
            alive_count1: 0,
            alive_count2: 0,
            played_card1: 0,
            played_card2: 0,
            has_played1: false,
            has_played2: false,
            current_round: 0,
            round_results: Vec::new(&env),
            lifecycle_state: STATE_WAITING,
            winner: WINNER_NONE,
        };
        Self::write_game(&env, game_id, &game);

        EvGameCreated {
            game_id,
            creator: creator.clone(),
        }.publish(&env);

        Ok(game_id)
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Joining
    // ───────────────────────────────────────────────────────────────────────────

    /// Join a Waiting game with 6 encoded card types and their binding
    /// proof. Returns the assigned slot. Ingestion is all-or-nothing: a bad
    /// proof rejects the call before any card is stored.
    pub fn join_game(
        env: Env,
        game_id: u64,
        player: Address,
        encoded_types: Vec<Bytes>,
        proof: BytesN<32>,
    ) -> Result<u32, BattleError> {
        player.require_auth();

        let mut game = Self::read_game(&env, game_id)?;
        if game.lifecycle_state != STATE_WAITING {
            return Err(BattleError::InvalidState);
        }
        if game.players_joined >= 2 {
            return Err(BattleError::GameFull);
        }
        if game.player1 == Some(player.clone()) || game.player2 == Some(player.clone()) {
            return Err(BattleError::AlreadyJoined);
        }
        if Self::active_game_of(&env, &player).is_some() {
            return Err(BattleError::AlreadyInGame);
        }
        if encoded_types.len() != DECK_SIZE {
            return Err(BattleError::InvalidDeckSize);
        }

        let gateway = Self::gateway_client(&env)?;
        let cards = Self::ingest_deck(&env, &gateway, &player, encoded_types, proof)?;

        let slot = if game.player1.is_none() {
            game.player1 = Some(player.clone());
            game.cards1 = cards;
            game.alive_count1 = DECK_SIZE;
            PLAYER_1
        } else {
            game.player2 = Some(player.clone());
            game.cards2 = cards;
            game.alive_count2 = DECK_SIZE;
            PLAYER_2
        };
        game.players_joined += 1;

        Self::set_active_game(&env, &player, game_id);

        EvPlayerJoined {
            game_id,
            player: player.clone(),
            slot,
        }.publish(&env);

        if game.players_joined == 2 {
            game.lifecycle_state = STATE_PLAYING;
            EvGameStarted { game_id }.publish(&env);
        }

        Self::write_game(&env, game_id, &game);
        Ok(slot)
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Playing
    // ───────────────────────────────────────────────────────────────────────────

    /// Commit a card for the current round. When the second commitment of a
    /// round arrives, the battle resolves atomically within the same call.
    pub fn play_card(
        env: Env,
        game_id: u64,
        player: Address,
        card_index: u32,
    ) -> Result<(), BattleError> {
        player.require_auth();

        let mut game = Self::read_game(&env, game_id)?;
        if game.lifecycle_state != STATE_PLAYING {
            return Err(BattleError::InvalidState);
        }
        let slot = Self::resolve_slot(&game, &player)?;
        if card_index >= DECK_SIZE {
            return Err(BattleError::InvalidCardIndex);
        }

        let deck = Self::get_deck(&game, slot);
        let card = deck.get(card_index).unwrap();
        if !card.is_alive {
            return Err(BattleError::CardDead);
        }

        match slot {
            PLAYER_1 => {
                if game.has_played1 {
                    return Err(BattleError::AlreadyPlayedThisRound);
                }
                game.played_card1 = card_index;
                game.has_played1 = true;
            }
            _ => {
                if game.has_played2 {
                    return Err(BattleError::AlreadyPlayedThisRound);
                }
                game.played_card2 = card_index;
                game.has_played2 = true;
            }
        }

        EvCardPlayed {
            game_id,
            player: player.clone(),
            slot,
            card_index,
        }.publish(&env);

        if game.has_played1 && game.has_played2 {
            Self::resolve_battle(&env, game_id, &mut game)?;
        }

        Self::write_game(&env, game_id, &game);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Administrative closure
    // ───────────────────────────────────────────────────────────────────────────

    /// Force-close a stuck game (one player unresponsive, opponent never
    /// found). No winner is assigned; both players' active-game entries are
    /// released so they can play again.
    pub fn close_game(env: Env, game_id: u64) -> Result<(), BattleError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();

        let mut game = Self::read_game(&env, game_id)?;
        if game.lifecycle_state == STATE_FINISHED {
            return Err(BattleError::GameAlreadyEnded);
        }

        game.lifecycle_state = STATE_FINISHED;
        Self::release_players(&env, &game);
        Self::write_game(&env, game_id, &game);

        EvGameClosed { game_id }.publish(&env);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Views
    // ───────────────────────────────────────────────────────────────────────────

    pub fn get_game_info(env: Env, game_id: u64) -> Result<GameInfo, BattleError> {
        let game = Self::read_game(&env, game_id)?;
        Ok(GameInfo {
            state: game.lifecycle_state,
            round: game.current_round,
            joined: game.players_joined,
            player1: game.player1,
            player2: game.player2,
            winner: game.winner,
        })
    }

    /// Open deck view: callable by anyone. Confidentiality is enforced by
    /// the gateway's capability lists, not by this call — the handles are
    /// useless without a decrypt grant.
    pub fn get_player_cards(env: Env, game_id: u64, slot: u32) -> Result<PlayerCards, BattleError> {
        let game = Self::read_game(&env, game_id)?;
        let deck = match slot {
            PLAYER_1 => game.cards1,
            PLAYER_2 => game.cards2,
            _ => return Err(BattleError::InvalidSlot),
        };

        let mut type_handles = Vec::new(&env);
        let mut healths = Vec::new(&env);
        let mut alive = Vec::new(&env);
        let mut i: u32 = 0;
        while i < deck.len() {
            let card = deck.get(i).unwrap();
            type_handles.push_back(card.type_handle);
            healths.push_back(card.health);
            alive.push_back(card.is_alive);
            i += 1;
        }
        Ok(PlayerCards {
            type_handles,
            healths,
            alive,
        })
    }

    /// Authorization-gated deck view: the viewer must authenticate and be
    /// the occupant of one of the two slots; they get their own deck.
    pub fn get_my_cards(
        env: Env,
        game_id: u64,
        viewer: Address,
    ) -> Result<PlayerCards, BattleError> {
        viewer.require_auth();
        let game = Self::read_game(&env, game_id)?;
        let slot = Self::resolve_slot(&game, &viewer)?;
        Self::get_player_cards(env, game_id, slot)
    }

    pub fn get_alive_count(env: Env, game_id: u64, slot: u32) -> Result<u32, BattleError> {
        let game = Self::read_game(&env, game_id)?;
        match slot {
            PLAYER_1 => Ok(game.alive_count1),
            PLAYER_2 => Ok(game.alive_count2),
            _ => Err(BattleError::InvalidSlot),
        }
    }

    /// Confidential result-code handle for a resolved round (rounds count
    /// from 0). Decryptable by the two players through the gateway.
    pub fn get_round_result(env: Env, game_id: u64, round: u32) -> Result<u64, BattleError> {
        let game = Self::read_game(&env, game_id)?;
        game.round_results
            .get(round)
            .ok_or(BattleError::RoundNotResolved)
    }

    pub fn get_active_game(env: Env, player: Address) -> Option<u64> {
        Self::active_game_of(&env, &player)
    }

    pub fn get_rules(env: Env) -> Result<RuleConfig, BattleError> {
        Self::load_rules(&env)
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Admin
    // ───────────────────────────────────────────────────────────────────────────

    pub fn get_admin(env: Env) -> Result<Address, BattleError> {
        Self::load_admin(&env)
    }

    pub fn set_admin(env: Env, new_admin: Address) -> Result<(), BattleError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage().instance().set(&StorageKey::Admin, &new_admin);
        Ok(())
    }

    pub fn get_gateway(env: Env) -> Result<Address, BattleError> {
        Self::load_gateway(&env)
    }

    pub fn set_gateway(env: Env, new_gateway: Address) -> Result<(), BattleError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage()
            .instance()
            .set(&StorageKey::GatewayAddress, &new_gateway);
        Ok(())
    }

    pub fn set_rules(env: Env, rules: RuleConfig) -> Result<(), BattleError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.storage().instance().set(&StorageKey::Rules, &rules);
        Ok(())
    }

    pub fn upgrade(env: Env, new_wasm_hash: BytesN<32>) -> Result<(), BattleError> {
        let admin = Self::load_admin(&env)?;
        admin.require_auth();
        env.deployer().update_current_contract_wasm(new_wasm_hash);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Confidential deck ingestion
    // ═══════════════════════════════════════════════════════════════════════════

    /// Ingest 6 encoded card types and build the deck.
    ///
    /// Each stored type passes the oblivious membership circuit:
    /// `valid = (t == Eagle) OR (t == Bear) OR (t == Snake)`, then
    /// `stored = select(valid, t, Eagle)`. The same gateway call sequence
    /// runs whether or not the submission was in range, so an invalid deck
    /// cannot be told apart by gas or by revert behavior. The player is
    /// granted read access to each stored type.
    fn ingest_deck(
        env: &Env,
        gateway: &GatewayClient,
        player: &Address,
        encoded_types: Vec<Bytes>,
        proof: BytesN<32>,
    ) -> Result<Vec<Card>, BattleError> {
        let this = env.current_contract_address();

        let handles = match gateway.try_ingest_batch(&this, player, &encoded_types, &proof) {
            Ok(Ok(handles)) => handles,
            _ => return Err(BattleError::InvalidProof),
        };

        let default_type = gateway.ct_constant(&this, &TOTEM_EAGLE);

        let mut cards: Vec<Card> = Vec::new(env);
        let mut i: u32 = 0;
        while i < handles.len() {
            let raw = handles.get(i).unwrap();

            let is_eagle = gateway.ct_eq_const(&this, &raw, &TOTEM_EAGLE);
            let is_bear = gateway.ct_eq_const(&this, &raw, &TOTEM_BEAR);
            let is_snake = gateway.ct_eq_const(&this, &raw, &TOTEM_SNAKE);
            let known = gateway.ct_or(
                &this,
                &gateway.ct_or(&this, &is_eagle, &is_bear),
                &is_snake,
            );
            let stored = gateway.ct_select(&this, &known, &raw, &default_type);
            gateway.grant_access(&this, &stored, player);

            cards.push_back(Card {
                type_handle: stored,
                health: CARD_HEALTH,
                is_alive: true,
            });
            i += 1;
        }
        Ok(cards)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Battle Resolution Engine
    // ═══════════════════════════════════════════════════════════════════════════

    /// Confidential cyclic-advantage test: does `attacker_ty` beat
    /// `defender_ty`? Eagle>Snake, Bear>Eagle, Snake>Bear, as one OR of
    /// three AND terms — no plaintext branch touches the types.
    fn wins_over(env: &Env, gateway: &GatewayClient, attacker_ty: u64, defender_ty: u64) -> u64 {
        let this = env.current_contract_address();

        let att_eagle = gateway.ct_eq_const(&this, &attacker_ty, &TOTEM_EAGLE);
        let att_bear = gateway.ct_eq_const(&this, &attacker_ty, &TOTEM_BEAR);
        let att_snake = gateway.ct_eq_const(&this, &attacker_ty, &TOTEM_SNAKE);
        let def_eagle = gateway.ct_eq_const(&this, &defender_ty, &TOTEM_EAGLE);
        let def_bear = gateway.ct_eq_const(&this, &defender_ty, &TOTEM_BEAR);
        let def_snake = gateway.ct_eq_const(&this, &defender_ty, &TOTEM_SNAKE);

        let eagle_takes_snake = gateway.ct_and(&this, &att_eagle, &def_snake);
        let bear_takes_eagle = gateway.ct_and(&this, &att_bear, &def_eagle);
        let snake_takes_bear = gateway.ct_and(&this, &att_snake, &def_bear);

        gateway.ct_or(
            &this,
            &gateway.ct_or(&this, &eagle_takes_snake, &bear_takes_eagle),
            &snake_takes_bear,
        )
    }

    /// Resolve a completed round: compute the confidential result code,
    /// apply survivorship, refresh alive counts, advance the round, and
    /// check termination.
    fn resolve_battle(
        env: &Env,
        game_id: u64,
        game: &mut TotemGame,
    ) -> Result<(), BattleError> {
        let this = env.current_contract_address();
        let gateway = Self::gateway_client(env)?;
        let rules = Self::load_rules(env)?;

        let idx1 = game.played_card1;
        let idx2 = game.played_card2;
        let card1 = game.cards1.get(idx1).unwrap();
        let card2 = game.cards2.get(idx2).unwrap();

        let mut p1_wins = Self::wins_over(env, &gateway, card1.type_handle, card2.type_handle);
        let mut p2_wins = Self::wins_over(env, &gateway, card2.type_handle, card1.type_handle);

        if rules.health_tiebreak {
            // Same-type clash falls back to the (public) health values.
            let same_type =
                gateway.ct_eq(&this, &card1.type_handle, &card2.type_handle);
            let h1_higher =
                gateway.ct_constant(&this, &((card1.health > card2.health) as u64));
            let h2_higher =
                gateway.ct_constant(&this, &((card2.health > card1.health) as u64));
            p1_wins = gateway.ct_or(
                &this,
                &p1_wins,
                &gateway.ct_and(&this, &same_type, &h1_higher),
            );
            p2_wins = gateway.ct_or(
                &this,
                &p2_wins,
                &gateway.ct_and(&this, &same_type, &h2_higher),
            );
        }

        // Three-way result code via nested select:
        // result = select(p1_wins, 1, select(p2_wins, 2, 0))
        let c_draw = gateway.ct_constant(&this, &RESULT_DRAW);
        let c_p1 = gateway.ct_constant(&this, &RESULT_PLAYER1_WIN);
        let c_p2 = gateway.ct_constant(&this, &RESULT_PLAYER2_WIN);
        let inner = gateway.ct_select(&this, &p2_wins, &c_p2, &c_draw);
        let result = gateway.ct_select(&this, &p1_wins, &c_p1, &inner);

        // Both players may read the round result off-path.
        if let Some(p1) = &game.player1 {
            gateway.grant_access(&this, &result, p1);
        }
        if let Some(p2) = &game.player2 {
            gateway.grant_access(&this, &result, p2);
        }
        game.round_results.push_back(result);

        if rules.extended_combat {
            // Extended rule: the three-way outcome is the one value made
            // public; only the loser's card dies, both on a draw.
            let outcome = gateway.decrypt(&result, &this);
            if outcome != RESULT_PLAYER1_WIN {
                Self::kill_card(&mut game.cards1, idx1);
            }
            if outcome != RESULT_PLAYER2_WIN {
                Self::kill_card(&mut game.cards2, idx2);
            }
        } else {
            // Default rule: both played cards die regardless of advantage.
            Self::kill_card(&mut game.cards1, idx1);
            Self::kill_card(&mut game.cards2, idx2);
        }

        // Fixed fold over the 6 slots, never a data-dependent loop.
        game.alive_count1 = Self::count_alive(&game.cards1);
        game.alive_count2 = Self::count_alive(&game.cards2);

        EvBattleResolved {
            game_id,
            round: game.current_round,
            card1_index: idx1,
            card2_index: idx2,
            result_handle: result,
        }.publish(env);

        game.current_round += 1;
        game.has_played1 = false;
        game.has_played2 = false;

        if game.alive_count1 == 0 || game.alive_count2 == 0 {
            Self::finalize_game(env, game_id, game);
        }
        Ok(())
    }

    /// Flip one card's alive flag to false. Never flips back.
    fn kill_card(deck: &mut Vec<Card>, index: u32) {
        let mut card = deck.get(index).unwrap();
        card.is_alive = false;
        deck.set(index, card);
    }

    fn count_alive(deck: &Vec<Card>) -> u32 {
        let mut count: u32 = 0;
        let mut i: u32 = 0;
        while i < DECK_SIZE {
            count += deck.get(i).unwrap().is_alive as u32;
            i += 1;
        }
        count
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Finalization
    // ═══════════════════════════════════════════════════════════════════════════

    fn finalize_game(env: &Env, game_id: u64, game: &mut TotemGame) {
        game.lifecycle_state = STATE_FINISHED;
        game.winner = if game.alive_count1 > game.alive_count2 {
            PLAYER_1
        } else if game.alive_count2 > game.alive_count1 {
            PLAYER_2
        } else {
            WINNER_NONE
        };

        Self::release_players(env, game);

        EvGameEnded {
            game_id,
            winner: game.winner,
        }.publish(env);
    }

    /// Drop both players' active-game index entries.
    fn release_players(env: &Env, game: &TotemGame) {
        if let Some(p1) = &game.player1 {
            env.storage()
                .temporary()
                .remove(&StorageKey::ActiveGame(p1.clone()));
        }
        if let Some(p2) = &game.player2 {
            env.storage()
                .temporary()
                .remove(&StorageKey::ActiveGame(p2.clone()));
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Registry index & guards
    // ═══════════════════════════════════════════════════════════════════════════

    fn active_game_of(env: &Env, player: &Address) -> Option<u64> {
        env.storage()
            .temporary()
            .get(&StorageKey::ActiveGame(player.clone()))
    }

    fn set_active_game(env: &Env, player: &Address, game_id: u64) {
        let key = StorageKey::ActiveGame(player.clone());
        env.storage().temporary().set(&key, &game_id);
        env.storage()
            .temporary()
            .extend_ttl(&key, GAME_TTL_LEDGERS, GAME_TTL_LEDGERS);
    }

    fn resolve_slot(game: &TotemGame, player: &Address) -> Result<u32, BattleError> {
        if game.player1.as_ref() == Some(player) {
            Ok(PLAYER_1)
        } else if game.player2.as_ref() == Some(player) {
            Ok(PLAYER_2)
        } else {
            Err(BattleError::NotAPlayer)
        }
    }

    fn get_deck(game: &TotemGame, slot: u32) -> Vec<Card> {
        match slot {
            PLAYER_1 => game.cards1.clone(),
            _ => game.cards2.clone(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Storage
    // ═══════════════════════════════════════════════════════════════════════════

    fn read_game(env: &Env, game_id: u64) -> Result<TotemGame, BattleError> {
        env.storage()
            .temporary()
            .get(&StorageKey::Game(game_id))
            .ok_or(BattleError::GameNotFound)
    }

    fn write_game(env: &Env, game_id: u64, game: &TotemGame) {
        let key = StorageKey::Game(game_id);
        env.storage().temporary().set(&key, game);
        env.storage()
            .temporary()
            .extend_ttl(&key, GAME_TTL_LEDGERS, GAME_TTL_LEDGERS);
        // Keep instance storage (admin, gateway, rules, id counter) alive
        env.storage()
            .instance()
            .extend_ttl(GAME_TTL_LEDGERS, GAME_TTL_LEDGERS);
    }

    fn gateway_client(env: &Env) -> Result<GatewayClient, BattleError> {
        let addr = Self::load_gateway(env)?;
        Ok(GatewayClient::new(env, &addr))
    }

    fn load_admin(env: &Env) -> Result<Address, BattleError> {
        env.storage()
            .instance()
            .get(&StorageKey::Admin)
            .ok_or(BattleError::AdminNotSet)
    }

    fn load_gateway(env: &Env) -> Result<Address, BattleError> {
        env.storage()
            .instance()
            .get(&StorageKey::GatewayAddress)
            .ok_or(BattleError::GatewayNotSet)
    }

    fn load_rules(env: &Env) -> Result<RuleConfig, BattleError> {
        env.storage()
            .instance()
            .get(&StorageKey::Rules)
            .ok_or(BattleError::RulesNotSet)
    }
}
