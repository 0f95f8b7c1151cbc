use std::io::{BufReader, Cursor};

use der::{
    asn1::Ia5String,
    time::{OffsetDateTime, PrimitiveDateTime},
    Decode as _,
};
use x509_cert::{
    builder::{Builder as _, RequestBuilder as CsrBuilder},
    ext::pkix::{name::GeneralName, SubjectAltName},
    name::Name,
};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Make a P-256 private key (from which we can derive a public key).
///
/// Used both for finalizing orders (the certificate key) and as the
/// default account key type.
pub fn create_p256_key() -> p256::ecdsa::SigningKey {
    let csprng = &mut rand::thread_rng();
    ecdsa::SigningKey::from(p256::SecretKey::random(csprng))
}

/// Creates a CSR for `domains` and signs it with `signer`.
///
/// The first item of `domains` becomes the CSR's Common Name (CN); all
/// domains, the first included, go into the Subject Alternative Name
/// extension. RFC-conforming CAs read the SAN list, not the CN.
pub(crate) fn create_csr(
    signer: &p256::ecdsa::SigningKey,
    domains: &[&str],
) -> Result<x509_cert::request::CertReq> {
    let primary_domain = domains.first().ok_or(Error::NoIdentifiers)?;

    let subject = format!("CN={primary_domain}")
        .parse::<Name>()
        .map_err(|err| Error::Key(format!("invalid subject name: {err}")))?;

    let mut csr = CsrBuilder::new(subject, signer)
        .map_err(|err| Error::Key(format!("CSR builder: {err}")))?;

    let san = domains
        .iter()
        .map(|domain| {
            Ia5String::new(domain)
                .map(GeneralName::DnsName)
                .map_err(|err| Error::Key(format!("invalid SAN {domain:?}: {err}")))
        })
        .collect::<Result<Vec<_>>>()?;

    csr.add_extension(&SubjectAltName(san))
        .map_err(|err| Error::Key(format!("CSR SAN extension: {err}")))?;

    csr.build::<p256::ecdsa::DerSignature>()
        .map_err(|err| Error::Key(format!("CSR signing: {err}")))
}

/// Extracts the DER of the first CERTIFICATE block in a PEM document.
pub(crate) fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    let mut rdr = BufReader::new(Cursor::new(pem));

    let result = rustls_pemfile::certs(&mut rdr)
        .next()
        .ok_or_else(|| Error::InvalidPem("no CERTIFICATE block found".to_owned()))?
        .map(|cert| cert.to_vec())
        .map_err(|err| Error::InvalidPem(err.to_string()));
    result
}

/// Encapsulated certificate and private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    private_key_pem: Zeroizing<String>,
    certificate: String,
}

impl Certificate {
    pub(crate) fn new(private_key_pem: Zeroizing<String>, certificate: String) -> Self {
        Certificate {
            private_key_pem,
            certificate,
        }
    }

    /// Reassemble a certificate from its PEM parts, validating both.
    pub fn parse(private_key_pem: Zeroizing<String>, certificate: String) -> Result<Self> {
        use der::DecodePem as _;
        use pkcs8::DecodePrivateKey as _;

        x509_cert::Certificate::from_pem(certificate.as_str())
            .map_err(|err| Error::InvalidPem(format!("certificate: {err}")))?;

        ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(&private_key_pem)
            .map_err(|err| Error::InvalidPem(format!("private key: {err}")))?;

        Ok(Certificate {
            private_key_pem,
            certificate,
        })
    }

    /// The private key in PEM format.
    pub fn private_key(&self) -> &str {
        &self.private_key_pem
    }

    /// The private key in DER encoding.
    pub fn private_key_der(&self) -> Result<Vec<u8>> {
        use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};

        let private_key = ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(&self.private_key_pem)
            .map_err(|err| Error::InvalidPem(format!("private key: {err}")))?;
        let der = private_key
            .to_pkcs8_der()
            .map_err(|err| Error::Key(err.to_string()))?;
        Ok(der.as_bytes().to_vec())
    }

    /// The issued certificate chain in PEM format.
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// The issued certificate chain in DER format, end-entity first.
    pub fn certificate_chain(&self) -> Result<Vec<Vec<u8>>> {
        let mut rdr = BufReader::new(Cursor::new(self.certificate()));

        rustls_pemfile::certs(&mut rdr)
            .map(|res| res.map(|cert| cert.to_vec()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| Error::InvalidPem(err.to_string()))
    }

    /// DER of the end-entity certificate (the chain's first entry).
    pub fn end_entity_der(&self) -> Result<Vec<u8>> {
        self.certificate_chain()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidPem("no certificates in chain".to_owned()))
    }

    /// Inspect the certificate to count the number of (whole) valid days
    /// left.
    ///
    /// It's up to the ACME API provider to decide how long an issued
    /// certificate is valid. Let's Encrypt sets the validity to 90 days.
    /// This function reports 89 days for a newly issued cert, since it
    /// counts _whole_ days.
    ///
    /// It is possible to get negative days for an expired certificate.
    pub fn valid_days_left(&self) -> Result<i64> {
        let cert_ee = self.end_entity_der()?;
        let cert = x509_cert::Certificate::from_der(&cert_ee)
            .map_err(|err| Error::InvalidPem(err.to_string()))?;

        let not_after = cert.tbs_certificate.validity.not_after.to_date_time();
        let not_after = PrimitiveDateTime::try_from(not_after)
            .map_err(|err| Error::InvalidPem(err.to_string()))?
            // X.509 validity times are UTC by construction.
            .assume_utc();

        let diff = not_after - OffsetDateTime::now_utc();

        Ok(diff.whole_days())
    }
}
