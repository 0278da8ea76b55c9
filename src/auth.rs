//! SPNEGO/NTLM session-setup token.
//!
//! The 3DS accepts the session immediately and never verifies credentials,
//! but the token sent must still be a syntactically valid GSS-API
//! NegTokenInit wrapping an NTLMSSP NEGOTIATE_MESSAGE so that a conformant
//! server would not reject it either. Only the first leg of the handshake
//! exists here; there is no challenge/response.
//!
//! References:
//! - [MS-NLMP] NT LAN Manager Authentication Protocol
//! - [MS-SPNG] SPNEGO Extension

/// NTLMSSP signature: `NTLMSSP\0`
const NTLMSSP_SIG: &[u8; 8] = b"NTLMSSP\0";

/// NEGOTIATE_MESSAGE flags: UNICODE | REQUEST_TARGET | NTLM | ALWAYS_SIGN |
/// EXTENDED_SESSIONSECURITY | 128-bit.
const NEGOTIATE_FLAGS: u32 = 0xA008_0205;

/// OID for SPNEGO: 1.3.6.1.5.5.2
const SPNEGO_OID: &[u8] = &[0x06, 0x06, 0x2b, 0x06, 0x01, 0x05, 0x05, 0x02];

/// OID for NTLMSSP: 1.3.6.1.4.1.311.2.2.10
const NTLMSSP_OID: &[u8] = &[
    0x06, 0x0a, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x02, 0x0a,
];

/// Build the SPNEGO NegTokenInit carried in SESSION_SETUP_ANDX.
pub fn build_negotiate_token() -> Vec<u8> {
    let ntlm = build_ntlm_negotiate();

    // mechTypes: SEQUENCE OF OID, in context [0]
    let mut mech_list = Vec::new();
    mech_list.push(0x30); // SEQUENCE
    push_der_length(&mut mech_list, NTLMSSP_OID.len());
    mech_list.extend_from_slice(NTLMSSP_OID);

    let mut mech_types = Vec::new();
    mech_types.push(0xa0); // context [0]
    push_der_length(&mut mech_types, mech_list.len());
    mech_types.extend_from_slice(&mech_list);

    // mechToken: OCTET STRING, in context [2]
    let mut octets = Vec::new();
    octets.push(0x04); // OCTET STRING
    push_der_length(&mut octets, ntlm.len());
    octets.extend_from_slice(&ntlm);

    let mut mech_token = Vec::new();
    mech_token.push(0xa2); // context [2]
    push_der_length(&mut mech_token, octets.len());
    mech_token.extend_from_slice(&octets);

    let mut neg_token_init = Vec::new();
    neg_token_init.push(0x30); // SEQUENCE (NegTokenInit)
    push_der_length(&mut neg_token_init, mech_types.len() + mech_token.len());
    neg_token_init.extend_from_slice(&mech_types);
    neg_token_init.extend_from_slice(&mech_token);

    let mut context = Vec::new();
    context.push(0xa0); // context [0] (NegotiationToken choice)
    push_der_length(&mut context, neg_token_init.len());
    context.extend_from_slice(&neg_token_init);

    let mut token = Vec::new();
    token.push(0x60); // APPLICATION 0 IMPLICIT (InitialContextToken)
    push_der_length(&mut token, SPNEGO_OID.len() + context.len());
    token.extend_from_slice(SPNEGO_OID);
    token.extend_from_slice(&context);

    token
}

/// Build a minimal NTLM NEGOTIATE_MESSAGE (type 1).
/// MS-NLMP 2.2.1.1: signature + MessageType + NegotiateFlags + empty
/// DomainNameFields + empty WorkstationFields.
fn build_ntlm_negotiate() -> Vec<u8> {
    let mut msg = Vec::with_capacity(32);
    msg.extend_from_slice(NTLMSSP_SIG);
    msg.extend_from_slice(&1u32.to_le_bytes());
    msg.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());
    msg.extend_from_slice(&[0u8; 8]); // DomainNameFields
    msg.extend_from_slice(&[0u8; 8]); // WorkstationFields
    msg
}

/// Push a DER length encoding into a buffer.
fn push_der_length(buf: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        buf.push(len as u8);
    } else if len < 0x100 {
        buf.push(0x81);
        buf.push(len as u8);
    } else {
        buf.push(0x82);
        buf.push((len >> 8) as u8);
        buf.push(len as u8);
    }
}
