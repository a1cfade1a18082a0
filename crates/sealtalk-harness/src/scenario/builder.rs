//! Scenario builder API.

use std::{fmt::Display, sync::Arc, time::Duration};

use sealtalk_core::{CacheKey, MemoryStore, Protocol, ProtocolConfig, Session, SharedStore};
use tracing::debug;

use crate::{
    SimEnv,
    scenario::{Delivery, OracleFn, World},
};

const INVITER_ID: u64 = 1;
const INVITEE_ID: u64 = 2;
const IDENTITY_SECRET: &[u8] = b"scenario identity secret";

/// Scripted action after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Encrypt and cache a message for the counterpart
    Send {
        /// Sender name
        from: String,
        /// Plaintext
        text: String,
    },
    /// Recipients decrypt every pending message
    Deliver,
    /// Move the virtual clock forward
    Advance(Duration),
    /// End the session
    Abort {
        /// Who ends it
        by: String,
    },
}

/// Scenario builder.
///
/// Must call `.oracle()` to get a [`RunnableScenario`].
pub struct Scenario {
    name: String,
    seed: u64,
    config: ProtocolConfig,
    inviter: Option<String>,
    invitee: Option<String>,
    steps: Vec<Step>,
}

impl Scenario {
    /// Create a new scenario with the given name.
    ///
    /// Defaults to seed 0 and 1024-bit RSA keys.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: 0,
            config: ProtocolConfig { rsa_bits: 1024, ..ProtocolConfig::default() },
            inviter: None,
            invitee: None,
            steps: Vec::new(),
        }
    }

    /// Seed for the simulated RNG.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Protocol settings.
    pub fn config(mut self, config: ProtocolConfig) -> Self {
        self.config = config;
        self
    }

    /// Name the party that creates the invitation.
    pub fn inviter(mut self, name: impl Into<String>) -> Self {
        self.inviter = Some(name.into());
        self
    }

    /// Name the party that accepts it.
    pub fn invitee(mut self, name: impl Into<String>) -> Self {
        self.invitee = Some(name.into());
        self
    }

    /// `from` sends `text`.
    pub fn send(mut self, from: impl Into<String>, text: impl Into<String>) -> Self {
        self.steps.push(Step::Send { from: from.into(), text: text.into() });
        self
    }

    /// Deliver every pending message.
    pub fn deliver(mut self) -> Self {
        self.steps.push(Step::Deliver);
        self
    }

    /// Let virtual time pass.
    pub fn advance(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Advance(duration));
        self
    }

    /// `by` ends the session.
    pub fn abort(mut self, by: impl Into<String>) -> Self {
        self.steps.push(Step::Abort { by: by.into() });
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory; a scenario cannot run without verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

struct Pending {
    from: String,
    to: String,
    sent: String,
    ciphertext: Vec<u8>,
    cache_key: CacheKey,
}

/// A scenario with an oracle, ready to execute.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// 1. Both parties get identities
    /// 2. The inviter creates an invitation, the invitee accepts it
    /// 3. The inviter unwraps the key and both session slots are written
    /// 4. The scripted steps run; step failures are recorded, not fatal
    /// 5. The oracle checks the final world
    ///
    /// Returns an error if the handshake fails or the oracle rejects.
    pub async fn run(self) -> Result<(), String> {
        let Self { scenario, oracle } = self;
        let name = scenario.name;
        let fail = |what: &str, e: &dyn Display| format!("Scenario '{name}': {what} failed: {e}");

        let (Some(inviter), Some(invitee)) = (scenario.inviter, scenario.invitee) else {
            return Err(format!("Scenario '{name}': needs an inviter and an invitee"));
        };
        if inviter == invitee {
            return Err(format!("Scenario '{name}': inviter and invitee must differ"));
        }

        let env = SimEnv::with_seed(scenario.seed);
        let store: SharedStore = Arc::new(MemoryStore::new(env.clone()));
        let protocol =
            Protocol::new(store, env.clone(), scenario.config, IDENTITY_SECRET.to_vec());

        let mut world = World::default();
        world.ids.insert(inviter.clone(), INVITER_ID);
        world.ids.insert(invitee.clone(), INVITEE_ID);

        for id in [INVITER_ID, INVITEE_ID] {
            protocol.identities.ensure(id).await.map_err(|e| fail("identity", &e))?;
        }

        let secure_id = protocol
            .ledger
            .create(INVITER_ID, &inviter)
            .await
            .map_err(|e| fail("create invitation", &e))?;
        let invitation = protocol
            .ledger
            .resolve(secure_id.as_str())
            .await
            .map_err(|e| fail("resolve invitation", &e))?;
        let invitee_key = protocol
            .handshake
            .accept(&invitation, INVITEE_ID, &invitee)
            .await
            .map_err(|e| fail("accept", &e))?;
        let inviter_key = protocol
            .handshake
            .receive(INVITER_ID, &secure_id)
            .await
            .map_err(|e| fail("receive", &e))?;

        let session = Session {
            secure_id: secure_id.clone(),
            inviter_id: INVITER_ID,
            inviter_name: inviter.clone(),
            invitee_id: INVITEE_ID,
            invitee_name: invitee.clone(),
        };
        protocol
            .sessions
            .set_symmetric(INVITER_ID, INVITEE_ID, &session)
            .await
            .map_err(|e| fail("store session", &e))?;
        protocol.ledger.consume(&secure_id).await.map_err(|e| fail("consume", &e))?;

        world.keys.insert(inviter.clone(), inviter_key);
        world.keys.insert(invitee.clone(), invitee_key);
        world.secure_id = Some(secure_id.clone());

        let mut pending: Vec<Pending> = Vec::new();
        for step in scenario.steps {
            debug!(scenario = %name, ?step, "step");
            match step {
                Step::Send { from, text } => {
                    let Some(user) = world.user_id(&from) else {
                        return Err(format!("Scenario '{name}': unknown actor {from}"));
                    };
                    let Some(key) = world.keys.get(&from) else {
                        return Err(format!("Scenario '{name}': {from} holds no key"));
                    };
                    let session = match protocol.sessions.get_verified(user).await {
                        Ok(Some(session)) => session,
                        Ok(None) => {
                            world.failures.push(format!("send from {from}: no active session"));
                            continue;
                        },
                        Err(e) => {
                            world.failures.push(format!("send from {from}: {e}"));
                            continue;
                        },
                    };
                    let Some((_, to)) = session.counterpart(user) else {
                        world.failures.push(format!("send from {from}: not in session"));
                        continue;
                    };

                    let ciphertext = protocol.cipher.encrypt(key, &text);
                    match protocol.cache.put(ciphertext.clone()).await {
                        Ok(cache_key) => pending.push(Pending {
                            from,
                            to: to.to_owned(),
                            sent: text,
                            ciphertext,
                            cache_key,
                        }),
                        Err(e) => world.failures.push(format!("send from {from}: {e}")),
                    }
                },
                Step::Deliver => {
                    for message in pending.drain(..) {
                        let received = match protocol.cache.get(message.cache_key.as_str()).await {
                            Ok(blob) => match protocol.handshake.session_key(&secure_id).await {
                                Ok(key) => {
                                    protocol.cipher.decrypt(&key, &blob).map_err(|e| e.to_string())
                                },
                                Err(e) => Err(e.to_string()),
                            },
                            Err(e) => Err(e.to_string()),
                        };
                        world.deliveries.push(Delivery {
                            from: message.from,
                            to: message.to,
                            sent: message.sent,
                            ciphertext: message.ciphertext,
                            received,
                        });
                    }
                },
                Step::Advance(duration) => env.advance(duration),
                Step::Abort { by } => {
                    let Some(user) = world.user_id(&by) else {
                        return Err(format!("Scenario '{name}': unknown actor {by}"));
                    };
                    match protocol.sessions.get(user).await {
                        Ok(Some(session)) => {
                            if let Err(e) = protocol.sessions.end(&session).await {
                                world.failures.push(format!("abort by {by}: {e}"));
                            }
                        },
                        Ok(None) => world.failures.push(format!("abort by {by}: no active session")),
                        Err(e) => world.failures.push(format!("abort by {by}: {e}")),
                    }
                },
            }
        }

        world.pending = pending.len();
        world.stored_key = protocol.handshake.session_key(&secure_id).await.ok();
        for (actor, id) in [(inviter, INVITER_ID), (invitee, INVITEE_ID)] {
            let slot = protocol.sessions.get(id).await.map_err(|e| fail("read session", &e))?;
            world.sessions.insert(actor, slot);
        }

        oracle(&world).map_err(|e| format!("Scenario '{name}': oracle rejected: {e}"))
    }
}
