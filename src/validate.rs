//! Cross-parameter validation and the immutable connection plan.

use tracing::debug;

use crate::error::ValidationError;
use crate::parameter::Parameter;
use crate::target::Target;

pub const DEFAULT_PORT: u16 = 50000;

/// The TLS trust policy resolved from `{tls, cert, certhash}`.
///
/// Precedence: a pinned hash beats a pinned certificate beats the system
/// trust store; with `tls=false` no verification applies at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVerifyMode {
    None,
    Cert,
    Hash,
    System,
}

impl std::fmt::Display for TlsVerifyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TlsVerifyMode::None => "",
            TlsVerifyMode::Cert => "cert",
            TlsVerifyMode::Hash => "hash",
            TlsVerifyMode::System => "system",
        };
        f.write_str(name)
    }
}

/// An immutable, fully resolved connection plan derived from a [`Target`].
///
/// Transport selection is a preference order, not a single choice: when
/// `connect_unix` is non-empty the caller tries that socket first, falling
/// back to `connect_tcp` when it is also non-empty. For a local target both
/// are typically set; an explicit `sock=` clears the TCP side and a remote
/// host or TLS clears the unix side. `connect_scan` additionally defers
/// discovery to the socket directory. Opening the socket and performing the
/// TLS handshake are the caller's job; this type only answers *where* to
/// connect and *which* trust policy applies.
#[derive(Debug, Clone)]
pub struct Validated {
    generation: u64,
    scan: bool,
    unix: String,
    tcp: String,
    port: u16,
    tls: bool,
    verify: TlsVerifyMode,
    certhash_digits: String,
    cert: String,
    client_key: String,
    client_cert: String,
    binary: u16,
    user: String,
    password: String,
    database: String,
    language: String,
    autocommit: bool,
    timezone: Option<i32>,
    reply_size: i32,
}

impl Validated {
    /// Generation of the [`Target`] this plan was derived from; stale once
    /// the target mutates again.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the address should be discovered by scanning the socket
    /// directory rather than dialing directly.
    pub fn connect_scan(&self) -> bool {
        self.scan
    }

    /// Unix socket path to dial, empty when TCP (or scanning) applies.
    pub fn connect_unix(&self) -> &str {
        &self.unix
    }

    /// TCP host to dial, empty when a unix socket applies.
    pub fn connect_tcp(&self) -> &str {
        &self.tcp
    }

    pub fn connect_port(&self) -> u16 {
        self.port
    }

    pub fn connect_tls(&self) -> bool {
        self.tls
    }

    pub fn connect_verify(&self) -> TlsVerifyMode {
        self.verify
    }

    /// The pinned digest as lowercase hex digits, colons stripped.
    pub fn connect_certhash_digits(&self) -> &str {
        &self.certhash_digits
    }

    /// Trust anchor file for [`TlsVerifyMode::Cert`].
    pub fn connect_cert(&self) -> &str {
        &self.cert
    }

    pub fn connect_clientkey(&self) -> &str {
        &self.client_key
    }

    pub fn connect_clientcert(&self) -> &str {
        &self.client_cert
    }

    /// Negotiated binary result-set level; 0 disables the binary protocol.
    pub fn connect_binary(&self) -> u16 {
        self.binary
    }

    pub fn use_binary_protocol(&self) -> bool {
        self.binary > 0
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    /// Signed minute offset from UTC, `None` when the caller did not supply
    /// one.
    pub fn timezone(&self) -> Option<i32> {
        self.timezone
    }

    pub fn reply_size(&self) -> i32 {
        self.reply_size
    }
}

impl Target {
    /// Applies the cross-parameter rules and produces an immutable plan.
    ///
    /// Fails fast on the first violated rule.
    pub fn validate(&self) -> Result<Validated, ValidationError> {
        let sock = self.get_str(Parameter::Sock);
        let host = self.get_str(Parameter::Host);
        let raw_port = self.get_int(Parameter::Port).unwrap_or(-1);
        let tls = self.get_bool(Parameter::Tls);

        if raw_port != -1 && !(1..=65535).contains(&raw_port) {
            return Err(ValidationError::PortOutOfRange(raw_port));
        }
        if !sock.is_empty() && !host.is_empty() && host != "localhost" {
            return Err(ValidationError::SockRequiresLocalhost(host));
        }
        if !sock.is_empty() && tls {
            return Err(ValidationError::SockTlsConflict);
        }

        let certhash = self.get_str(Parameter::CertHash);
        let certhash_digits = if certhash.is_empty() {
            String::new()
        } else {
            parse_certhash(&certhash)?
        };

        let client_key = self.get_str(Parameter::ClientKey);
        let client_cert = self.get_str(Parameter::ClientCert);
        let client_pem = self.get_str(Parameter::ClientPem);
        if !client_pem.is_empty() && (!client_key.is_empty() || !client_cert.is_empty()) {
            return Err(ValidationError::ClientPemConflict);
        }
        if !client_cert.is_empty() && client_key.is_empty() {
            return Err(ValidationError::ClientCertWithoutKey);
        }
        let (client_key, client_cert) = if client_pem.is_empty() {
            (client_key, client_cert)
        } else {
            (client_pem.clone(), client_pem)
        };

        let database = self.get_str(Parameter::Database);
        if !database.is_empty() && !valid_name(&database) {
            return Err(ValidationError::InvalidDatabaseName(database));
        }

        let binary = parse_binary_level(&self.get_str(Parameter::Binary))?;

        let cert = self.get_str(Parameter::Cert);
        let verify = if !certhash.is_empty() {
            TlsVerifyMode::Hash
        } else if !cert.is_empty() {
            TlsVerifyMode::Cert
        } else if tls {
            TlsVerifyMode::System
        } else {
            TlsVerifyMode::None
        };

        let scan = !database.is_empty()
            && sock.is_empty()
            && host.is_empty()
            && raw_port == -1
            && !tls;
        let port = if raw_port == -1 {
            DEFAULT_PORT
        } else {
            raw_port as u16
        };
        let unix = if !sock.is_empty() {
            sock
        } else if !tls && (host.is_empty() || host == "localhost") {
            let sockdir = self.get_str(Parameter::SockDir);
            format!("{sockdir}/.s.monetdb.{port}")
        } else {
            String::new()
        };
        let tcp = if !self.get_str(Parameter::Sock).is_empty() {
            String::new()
        } else if host.is_empty() {
            "localhost".to_string()
        } else {
            host
        };

        let plan = Validated {
            generation: self.generation(),
            scan,
            unix,
            tcp,
            port,
            tls,
            verify,
            certhash_digits,
            cert,
            client_key,
            client_cert,
            binary,
            user: self.get_str(Parameter::User),
            password: self.get_str(Parameter::Password),
            database,
            language: self.get_str(Parameter::Language),
            autocommit: self.get_bool(Parameter::Autocommit),
            timezone: self.get_int(Parameter::Timezone),
            reply_size: self.get_int(Parameter::ReplySize).unwrap_or(250),
        };
        debug!(
            scan = plan.scan,
            tcp = %plan.tcp,
            unix = %plan.unix,
            port = plan.port,
            verify = %plan.verify,
            "validated connection target"
        );
        Ok(plan)
    }
}

/// `sha256:` followed by hex digits; colons are permitted as grouping and
/// stripped from the result.
fn parse_certhash(certhash: &str) -> Result<String, ValidationError> {
    let invalid = || ValidationError::InvalidCertHash(certhash.to_string());
    let digits = certhash.strip_prefix("sha256:").ok_or_else(invalid)?;
    let mut normalized = String::with_capacity(digits.len());
    for c in digits.chars() {
        match c {
            ':' => continue,
            '0'..='9' | 'a'..='f' => normalized.push(c),
            'A'..='F' => normalized.push(c.to_ascii_lowercase()),
            _ => return Err(invalid()),
        }
    }
    if normalized.is_empty() {
        return Err(invalid());
    }
    Ok(normalized)
}

/// `binary` accepts the boolean words or an explicit level in [0, 65535].
fn parse_binary_level(raw: &str) -> Result<u16, ValidationError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => return Ok(u16::MAX),
        "false" | "no" | "off" => return Ok(0),
        _ => {}
    }
    raw.parse::<u16>()
        .map_err(|_| ValidationError::InvalidBinaryLevel(raw.to_string()))
}

fn valid_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_with(pairs: &[(&str, &str)]) -> Target {
        let mut target = Target::new();
        for (k, v) in pairs {
            target.set_string(k, v).unwrap();
        }
        target
    }

    #[test]
    fn test_default_target_validates() {
        let plan = Target::new().validate().unwrap();
        assert!(!plan.connect_scan());
        assert_eq!("localhost", plan.connect_tcp());
        assert_eq!(DEFAULT_PORT, plan.connect_port());
        assert_eq!("/tmp/.s.monetdb.50000", plan.connect_unix());
        assert_eq!(TlsVerifyMode::None, plan.connect_verify());
    }

    #[test]
    fn test_sock_tls_cannot_be_combined() {
        let target = target_with(&[("sock", "/tmp/db.sock"), ("tls", "true")]);
        let err = target.validate().unwrap_err();
        assert!(err.to_string().contains("cannot be combined"));
    }

    #[test]
    fn test_sock_requires_localhost() {
        let target = target_with(&[("sock", "/tmp/db.sock"), ("host", "db.example.com")]);
        assert!(matches!(
            target.validate().unwrap_err(),
            ValidationError::SockRequiresLocalhost(_)
        ));
        // empty host and literal localhost are both fine
        target_with(&[("sock", "/tmp/db.sock")]).validate().unwrap();
        target_with(&[("sock", "/tmp/db.sock"), ("host", "localhost")])
            .validate()
            .unwrap();
    }

    #[test]
    fn test_port_range() {
        assert!(matches!(
            target_with(&[("port", "0")]).validate().unwrap_err(),
            ValidationError::PortOutOfRange(0)
        ));
        assert!(matches!(
            target_with(&[("port", "65536")]).validate().unwrap_err(),
            ValidationError::PortOutOfRange(65536)
        ));
        let plan = target_with(&[("port", "65535")]).validate().unwrap();
        assert_eq!(65535, plan.connect_port());
    }

    #[test]
    fn test_verify_mode_table() {
        // all combinations of {certhash, cert, tls} consistent with the
        // precedence rules
        let hash = ("certhash", "sha256:abcdef");
        let cert = ("cert", "/etc/ca.pem");
        let cases: &[(&[(&str, &str)], TlsVerifyMode)] = &[
            (&[hash], TlsVerifyMode::Hash),
            (&[hash, ("tls", "true")], TlsVerifyMode::Hash),
            (&[hash, cert], TlsVerifyMode::Hash),
            (&[hash, cert, ("tls", "true")], TlsVerifyMode::Hash),
            (&[cert], TlsVerifyMode::Cert),
            (&[cert, ("tls", "true")], TlsVerifyMode::Cert),
            (&[("tls", "true")], TlsVerifyMode::System),
            (&[("tls", "false")], TlsVerifyMode::None),
            (&[], TlsVerifyMode::None),
        ];
        for (pairs, expected) in cases {
            let plan = target_with(pairs).validate().unwrap();
            assert_eq!(*expected, plan.connect_verify(), "for {pairs:?}");
        }
    }

    #[test]
    fn test_certhash_digits() {
        let plan = target_with(&[("certhash", "sha256:AB:cd:12")]).validate().unwrap();
        assert_eq!("abcd12", plan.connect_certhash_digits());

        for bad in ["abcdef", "sha256:", "sha256:xyz", "sha1:abcdef"] {
            let err = target_with(&[("certhash", bad)]).validate().unwrap_err();
            assert!(matches!(err, ValidationError::InvalidCertHash(_)), "for {bad}");
        }
    }

    #[test]
    fn test_client_identity_rules() {
        let err = target_with(&[("clientcert", "/c.pem")]).validate().unwrap_err();
        assert_eq!(ValidationError::ClientCertWithoutKey, err);

        let err = target_with(&[("clientpem", "/b.pem"), ("clientkey", "/k.pem")])
            .validate()
            .unwrap_err();
        assert_eq!(ValidationError::ClientPemConflict, err);

        let plan = target_with(&[("clientkey", "/k.pem"), ("clientcert", "/c.pem")])
            .validate()
            .unwrap();
        assert_eq!("/k.pem", plan.connect_clientkey());
        assert_eq!("/c.pem", plan.connect_clientcert());

        // the combined file fills both
        let plan = target_with(&[("clientpem", "/b.pem")]).validate().unwrap();
        assert_eq!("/b.pem", plan.connect_clientkey());
        assert_eq!("/b.pem", plan.connect_clientcert());
    }

    #[test]
    fn test_connect_scan() {
        let plan = target_with(&[("database", "demo")]).validate().unwrap();
        assert!(plan.connect_scan());

        // any explicit address information disables scanning
        for pairs in [
            &[("database", "demo"), ("host", "localhost")][..],
            &[("database", "demo"), ("port", "50000")][..],
            &[("database", "demo"), ("sock", "/tmp/db.sock")][..],
            &[("database", "demo"), ("tls", "true")][..],
        ] {
            let plan = target_with(pairs).validate().unwrap();
            assert!(!plan.connect_scan(), "for {pairs:?}");
        }
    }

    #[test]
    fn test_unix_fallback_suppressed_by_tls() {
        let plan = target_with(&[("tls", "true")]).validate().unwrap();
        assert_eq!("", plan.connect_unix());
        assert_eq!("localhost", plan.connect_tcp());
        assert_eq!(TlsVerifyMode::System, plan.connect_verify());
    }

    #[test]
    fn test_binary_levels() {
        assert_eq!(u16::MAX, target_with(&[]).validate().unwrap().connect_binary());
        let plan = target_with(&[("binary", "off")]).validate().unwrap();
        assert_eq!(0, plan.connect_binary());
        assert!(!plan.use_binary_protocol());
        let plan = target_with(&[("binary", "5")]).validate().unwrap();
        assert_eq!(5, plan.connect_binary());
        assert!(target_with(&[("binary", "65536")]).validate().is_err());
    }

    #[test]
    fn test_database_name_charset() {
        target_with(&[("database", "demo_2-b")]).validate().unwrap();
        assert!(matches!(
            target_with(&[("database", "de mo")]).validate().unwrap_err(),
            ValidationError::InvalidDatabaseName(_)
        ));
    }

    #[test]
    fn test_timezone_passthrough() {
        assert_eq!(None, Target::new().validate().unwrap().timezone());
        let plan = target_with(&[("timezone", "-480")]).validate().unwrap();
        assert_eq!(Some(-480), plan.timezone());
    }
}
