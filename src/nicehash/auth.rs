use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub org_id: String,
}

/// Inputs of one signed GET request besides the credentials.
#[derive(Debug, Clone)]
pub struct SignedRequest<'a> {
    pub time_ms: u64,
    pub nonce: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a str,
}

/// Value of the `X-Auth` header: `<api key>:<hex hmac-sha256>`.
pub fn auth_header(
    credentials: &Credentials,
    request: &SignedRequest<'_>,
) -> Result<String, InvalidLength> {
    let time = request.time_ms.to_string();
    let mut mac = HmacSha256::new_from_slice(credentials.api_secret.as_bytes())?;

    let fields: [&[u8]; 9] = [
        credentials.api_key.as_bytes(),
        time.as_bytes(),
        request.nonce.as_bytes(),
        b"",
        credentials.org_id.as_bytes(),
        b"",
        request.method.as_bytes(),
        request.path.as_bytes(),
        request.query.as_bytes(),
    ];
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            mac.update(&[0]);
        }
        mac.update(field);
    }

    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{}:{}", credentials.api_key, signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            api_key: "4ebd366d-76f4-4400-a3b6-e51515d054d6".to_string(),
            api_secret: "fd8a1652-728b-42fe-82b8-f623e56da8850750f5bf-ce66-4ca7-8b84-93651abc723b"
                .to_string(),
            org_id: "da41b3bc-3d0b-4226-b7ea-aee73f94a518".to_string(),
        }
    }

    #[test]
    fn signs_documented_example() {
        let header = auth_header(
            &credentials(),
            &SignedRequest {
                time_ms: 1543597115712,
                nonce: "9675d0f8-1325-484b-9594-c9d6d3268890",
                method: "GET",
                path: "/main/api/v2/hashpower/orderBook",
                query: "algorithm=X16R&page=0&size=100",
            },
        )
        .expect("signature");

        assert_eq!(
            header,
            "4ebd366d-76f4-4400-a3b6-e51515d054d6:21e6a16f6eb34ac476d59f969f548b47fffe3fea318d9c99e77fc710d2fed798"
        );
    }

    #[test]
    fn signs_rigs_request_without_query() {
        let header = auth_header(
            &credentials(),
            &SignedRequest {
                time_ms: 1543597115712,
                nonce: "9675d0f8-1325-484b-9594-c9d6d3268890",
                method: "GET",
                path: "/main/api/v2/mining/rigs2",
                query: "",
            },
        )
        .expect("signature");

        assert!(header.ends_with(
            ":4eb9ce59d8ec84b3448c46ad33f9496d108174a8ecc245991c94b327557735ac"
        ));
    }
}
