//! The location service built on top of the credential scheme.
//!
//! The server runs a one-time setup over the universe of subscription flags,
//! assigning each flag an attribute slot and a public attribute value derived
//! from its name. Users register by committing to a secret of their own
//! (slot 0) and letting the server sign their subscriptions blindly; location
//! queries then carry a showing that discloses exactly the flags the query
//! needs, bound to the `"lat,lon"` message.
use std::collections::{BTreeMap, BTreeSet, HashMap};

use bls12_381::Scalar;
use ff::Field;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::bilinear::hash_to_scalar;
use crate::error::Error;
use crate::issuance::{
    create_issue_request, obtain_credential, sign_issue_request, BlindSignature, Credential,
    IssueRequest, RequestState,
};
use crate::ps::{keygen, AttributeMap, PublicKey, SecretKey};
use crate::serde::{deserialize_scalar_map, serialize_scalar_map};
use crate::showing::{create_disclosure_proof, verify_disclosure_proof, DisclosureProof};

/// The attribute slot reserved for the user's own secret.
pub const USER_ATTRIBUTE_INDEX: u32 = 0;

/// The public parameters clients work against: the verification key and the
/// slot assigned to each subscription flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceParameters {
    pub public_key: PublicKey,
    pub subscriptions: BTreeMap<String, u32>,
}

impl ServiceParameters {
    /// The attribute value every party derives for a subscription flag.
    fn flag_attribute(name: &str) -> Scalar {
        hash_to_scalar(name.as_bytes())
    }

    fn flag_index(&self, name: &str) -> Result<u32, Error> {
        self.subscriptions
            .get(name)
            .copied()
            .ok_or_else(|| Error::InvalidInput(format!("unknown subscription {:?}", name)))
    }
}

/// The server's reply to a registration: the blind signature plus the
/// attributes the server filled in, so the client can assemble the full map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub blind_signature: BlindSignature,
    #[serde(
        serialize_with = "serialize_scalar_map",
        deserialize_with = "deserialize_scalar_map"
    )]
    pub issuer_attributes: AttributeMap,
}

/// A location query: the position message and the showing authorizing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRequest {
    pub message: String,
    pub proof: DisclosureProof,
}

/// The issuing and verifying side of the service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Server {
    sk: SecretKey,
    params: ServiceParameters,
    subscribers: HashMap<String, BTreeSet<String>>,
}

impl Server {
    /// One-time setup over the universe of subscription flags.
    ///
    /// Flags get slots 1..=n; slot 0 stays reserved for user secrets.
    pub fn setup(rng: &mut impl CryptoRngCore, flags: &[&str]) -> Result<Self, Error> {
        let mut subscriptions = BTreeMap::new();
        for (i, &name) in flags.iter().enumerate() {
            if subscriptions.insert(name.to_string(), i as u32 + 1).is_some() {
                return Err(Error::InvalidInput(format!(
                    "duplicate subscription flag {:?}",
                    name
                )));
            }
        }

        let (sk, public_key) = keygen(rng, flags.len() + 1);
        Ok(Self {
            sk,
            params: ServiceParameters {
                public_key,
                subscriptions,
            },
            subscribers: HashMap::new(),
        })
    }

    /// The public parameters to hand to clients.
    pub fn parameters(&self) -> &ServiceParameters {
        &self.params
    }

    fn subscription_attributes(&self, flags: &[&str]) -> Result<AttributeMap, Error> {
        flags
            .iter()
            .map(|&name| {
                let index = self.params.flag_index(name)?;
                Ok((index, ServiceParameters::flag_attribute(name)))
            })
            .collect()
    }

    /// Register an account: check the issuance request and sign the user's
    /// commitment together with the requested subscription flags.
    pub fn process_registration(
        &mut self,
        rng: &mut impl CryptoRngCore,
        username: &str,
        request: &IssueRequest,
        flags: &[&str],
    ) -> Result<RegistrationResponse, Error> {
        let issuer_attributes = self.subscription_attributes(flags)?;
        let blind_signature =
            sign_issue_request(rng, &self.sk, &self.params.public_key, request, &issuer_attributes)?;

        self.subscribers
            .entry(username.to_string())
            .or_default()
            .extend(flags.iter().map(|f| f.to_string()));

        Ok(RegistrationResponse {
            blind_signature,
            issuer_attributes,
        })
    }

    /// The flags a username has registered for, if any.
    pub fn subscriptions_of(&self, username: &str) -> Option<&BTreeSet<String>> {
        self.subscribers.get(username)
    }

    /// Authorize a location query that claims the given subscription flags.
    ///
    /// The showing must verify against the query's message, and every
    /// required flag must be disclosed with its well-known attribute value.
    pub fn authorize_location_request(
        &self,
        request: &LocationRequest,
        required_flags: &[&str],
    ) -> Result<(), Error> {
        verify_disclosure_proof(
            &self.params.public_key,
            &request.proof,
            request.message.as_bytes(),
        )?;

        for &name in required_flags {
            let index = self.params.flag_index(name)?;
            let expected = ServiceParameters::flag_attribute(name);
            match request.proof.disclosed().get(&index) {
                Some(value) if *value == expected => {}
                _ => return Err(Error::ProofRejected),
            }
        }
        Ok(())
    }
}

/// Start a registration: draw the user's secret attribute and commit to it.
///
/// The returned state stays on the client and unlocks the credential once
/// the server responds.
pub fn prepare_registration(
    rng: &mut impl CryptoRngCore,
    params: &ServiceParameters,
) -> Result<(IssueRequest, RequestState), Error> {
    let user_attributes: AttributeMap = [(USER_ATTRIBUTE_INDEX, Scalar::random(&mut *rng))]
        .into_iter()
        .collect();
    create_issue_request(rng, &params.public_key, &user_attributes)
}

/// Unblind the server's response into a credential.
pub fn finalize_registration(
    params: &ServiceParameters,
    response: &RegistrationResponse,
    state: RequestState,
) -> Result<Credential, Error> {
    obtain_credential(
        &params.public_key,
        &response.blind_signature,
        state,
        &response.issuer_attributes,
    )
}

/// Build a location query disclosing exactly the given flags.
///
/// The user's secret attribute and every other subscription stay hidden.
pub fn request_location(
    rng: &mut impl CryptoRngCore,
    params: &ServiceParameters,
    credential: &Credential,
    lat: f64,
    lon: f64,
    flags: &[&str],
) -> Result<LocationRequest, Error> {
    let mut disclose = BTreeSet::new();
    for &name in flags {
        let index = params.flag_index(name)?;
        if !credential.attributes().contains_key(&index) {
            return Err(Error::InvalidInput(format!(
                "credential has no subscription for {:?}",
                name
            )));
        }
        disclose.insert(index);
    }

    let hidden: BTreeSet<u32> = credential
        .attributes()
        .keys()
        .copied()
        .filter(|i| !disclose.contains(i))
        .collect();

    let message = format!("{},{}", lat, lon);
    let proof = create_disclosure_proof(
        rng,
        &params.public_key,
        credential,
        &hidden,
        message.as_bytes(),
    )?;
    Ok(LocationRequest { message, proof })
}
