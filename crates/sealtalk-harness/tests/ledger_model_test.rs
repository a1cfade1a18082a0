//! Model-based property tests for invitations.
//!
//! Random sequences of create, accept, revoke and clock advances run against
//! the real ledger and handshake over a simulated clock, and against a
//! reference model of invitation lifetimes. Every step must agree.

use std::{sync::Arc, time::Duration};

use proptest::prelude::*;
use sealtalk_core::{CoreError, MemoryStore, Protocol, ProtocolConfig, SecureId, UserId};
use sealtalk_harness::SimEnv;

const USERS: u64 = 3;
const INVITATION_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
enum Operation {
    Create { inviter: UserId },
    Accept { index: usize, invitee: UserId },
    Revoke { index: usize },
    Advance { secs: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Accepted,
    Invalid,
    SelfInvite,
    Used,
    Revoked,
    Advanced,
    Skipped,
    Unexpected,
}

#[derive(Debug)]
struct ModelInvitation {
    inviter: UserId,
    expires_at: Duration,
    set_up: bool,
    revoked: bool,
}

/// Reference model of invitation lifetimes.
#[derive(Debug, Default)]
struct Model {
    now: Duration,
    invitations: Vec<ModelInvitation>,
}

impl Model {
    fn apply(&mut self, op: &Operation) -> Outcome {
        match *op {
            Operation::Create { inviter } => {
                self.invitations.push(ModelInvitation {
                    inviter,
                    expires_at: self.now + INVITATION_TTL,
                    set_up: false,
                    revoked: false,
                });
                Outcome::Created
            },
            Operation::Accept { index, invitee } => {
                let now = self.now;
                let Some(invitation) = self.pick(index) else {
                    return Outcome::Skipped;
                };
                if invitation.revoked || now >= invitation.expires_at {
                    Outcome::Invalid
                } else if invitation.inviter == invitee {
                    Outcome::SelfInvite
                } else if invitation.set_up {
                    Outcome::Used
                } else {
                    invitation.set_up = true;
                    Outcome::Accepted
                }
            },
            Operation::Revoke { index } => match self.pick(index) {
                Some(invitation) => {
                    invitation.revoked = true;
                    Outcome::Revoked
                },
                None => Outcome::Skipped,
            },
            Operation::Advance { secs } => {
                self.now += Duration::from_secs(secs);
                Outcome::Advanced
            },
        }
    }

    fn pick(&mut self, index: usize) -> Option<&mut ModelInvitation> {
        let len = self.invitations.len();
        if len == 0 { None } else { self.invitations.get_mut(index % len) }
    }
}

/// The real ledger and handshake over a simulated clock.
struct Real {
    env: SimEnv,
    protocol: Protocol<SimEnv>,
    invitations: Vec<SecureId>,
}

impl Real {
    async fn new(seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let config = ProtocolConfig {
            rsa_bits: 1024,
            invitation_ttl: INVITATION_TTL,
            ..ProtocolConfig::default()
        };
        let store = Arc::new(MemoryStore::new(env.clone()));
        let protocol = Protocol::new(store, env.clone(), config, b"model secret".to_vec());
        for user in 0..USERS {
            protocol.identities.ensure(user).await.expect("identity");
        }
        Self { env, protocol, invitations: Vec::new() }
    }

    fn pick(&self, index: usize) -> Option<&SecureId> {
        let len = self.invitations.len();
        if len == 0 { None } else { self.invitations.get(index % len) }
    }

    async fn apply(&mut self, op: &Operation) -> Outcome {
        match *op {
            Operation::Create { inviter } => {
                match self.protocol.ledger.create(inviter, "inviter").await {
                    Ok(secure_id) => {
                        self.invitations.push(secure_id);
                        Outcome::Created
                    },
                    Err(_) => Outcome::Unexpected,
                }
            },
            Operation::Accept { index, invitee } => {
                let Some(secure_id) = self.pick(index) else {
                    return Outcome::Skipped;
                };
                let invitation = match self.protocol.ledger.resolve(secure_id.as_str()).await {
                    Ok(invitation) => invitation,
                    Err(CoreError::InvalidOrExpired) => return Outcome::Invalid,
                    Err(_) => return Outcome::Unexpected,
                };
                match self.protocol.handshake.accept(&invitation, invitee, "invitee").await {
                    Ok(_) => Outcome::Accepted,
                    Err(CoreError::SelfInviteRejected) => Outcome::SelfInvite,
                    Err(CoreError::InvalidHandshakeState) => Outcome::Used,
                    Err(_) => Outcome::Unexpected,
                }
            },
            Operation::Revoke { index } => {
                let Some(secure_id) = self.pick(index).cloned() else {
                    return Outcome::Skipped;
                };
                match self.protocol.ledger.revoke(&secure_id).await {
                    Ok(()) => Outcome::Revoked,
                    Err(_) => Outcome::Unexpected,
                }
            },
            Operation::Advance { secs } => {
                self.env.advance(Duration::from_secs(secs));
                Outcome::Advanced
            },
        }
    }
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => (0..USERS).prop_map(|inviter| Operation::Create { inviter }),
        4 => (any::<usize>(), 0..USERS)
            .prop_map(|(index, invitee)| Operation::Accept { index, invitee }),
        1 => any::<usize>().prop_map(|index| Operation::Revoke { index }),
        2 => prop_oneof![Just(3599u64), Just(3600), 0..2000u64]
            .prop_map(|secs| Operation::Advance { secs }),
    ]
}

fn run(seed: u64, ops: &[Operation]) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| TestCaseError::fail(e.to_string()))?;

    runtime.block_on(async {
        let mut model = Model::default();
        let mut real = Real::new(seed).await;

        for (step, op) in ops.iter().enumerate() {
            let expected = model.apply(op);
            let actual = real.apply(op).await;
            prop_assert_eq!(actual, expected, "step {} diverged on {:?}", step, op);
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn ledger_matches_model(seed in any::<u64>(), ops in prop::collection::vec(operation(), 1..24)) {
        run(seed, &ops)?;
    }
}

#[test]
fn accept_is_single_use() {
    let ops = [
        Operation::Create { inviter: 0 },
        Operation::Accept { index: 0, invitee: 1 },
        Operation::Accept { index: 0, invitee: 2 },
    ];
    let mut model = Model::default();
    let outcomes: Vec<_> = ops.iter().map(|op| model.apply(op)).collect();
    assert_eq!(outcomes, [Outcome::Created, Outcome::Accepted, Outcome::Used]);
    run(1, &ops).unwrap();
}

#[test]
fn expiry_boundary() {
    let ops = [
        Operation::Create { inviter: 0 },
        Operation::Advance { secs: 3599 },
        Operation::Accept { index: 0, invitee: 1 },
        Operation::Create { inviter: 1 },
        Operation::Advance { secs: 3600 },
        Operation::Accept { index: 1, invitee: 2 },
    ];
    let mut model = Model::default();
    let outcomes: Vec<_> = ops.iter().map(|op| model.apply(op)).collect();
    assert_eq!(outcomes[2], Outcome::Accepted);
    assert_eq!(outcomes[5], Outcome::Invalid);
    run(2, &ops).unwrap();
}

#[test]
fn revoked_invitation_is_invalid() {
    let ops = [
        Operation::Create { inviter: 2 },
        Operation::Revoke { index: 0 },
        Operation::Accept { index: 0, invitee: 0 },
    ];
    run(3, &ops).unwrap();
}
