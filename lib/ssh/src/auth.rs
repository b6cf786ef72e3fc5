/// Exactly one of these backs every [`crate::Host`] per the data
/// model invariant; the kind is stored alongside the host row, not
/// inferred from which field is populated.
#[derive(Debug, Clone)]
pub enum SshAuth {
  Password(String),
  PrivateKey { path: String, passphrase: Option<String> },
}
