//! Integration grid for the wire codec: every valid shape round-trips,
//! every invalid shape decodes to a typed error and never a partial
//! value.

use boopd_protocol::{base36, ClientFrame, DecodeError, ServerFrame};

#[test]
fn every_client_frame_roundtrips() -> Result<(), DecodeError> {
    let frames = [
        ClientFrame::Heartbeat,
        ClientFrame::Boop { boop_id: 0 },
        ClientFrame::Boop { boop_id: 1 },
        ClientFrame::Boop { boop_id: 1_001 },
        ClientFrame::CooldownQuery { query_id: 0 },
        ClientFrame::CooldownQuery { query_id: base36::MAX_SAFE_INT },
    ];
    for frame in frames {
        assert_eq!(ClientFrame::decode(&frame.encode())?, frame);
    }
    Ok(())
}

#[test]
fn invalid_client_frames_never_decode() {
    let invalid = [
        "",
        " ",
        "x",
        "hh",
        "h ",
        "b",
        "d",
        "b-1",
        "bB",
        "b1,2",
        "b1 ",
        "bzzzzzzzzzzzz", // 12 digits
        "bzzzzzzzzzzz",  // 11 digits but past 2^53
    ];
    for text in invalid {
        assert!(
            ClientFrame::decode(text).is_err(),
            "{text:?} unexpectedly decoded"
        );
    }

    // "boop" is, deliberately, a legal boop request: tag 'b' with the
    // base-36 payload "oop".
    assert_eq!(
        ClientFrame::decode("boop"),
        Ok(ClientFrame::Boop {
            boop_id: 24 * 36 * 36 + 24 * 36 + 25
        })
    );
}

#[test]
fn count_frames_render_base36() {
    // gbc=42 displays as "c16"; after one boop the count reads "c17".
    assert_eq!(ServerFrame::Count { count: 42 }.encode(), "c16");
    assert_eq!(ServerFrame::Count { count: 43 }.encode(), "c17");
}

#[test]
fn reject_frame_carries_remaining_cooldown() {
    let frame = ServerFrame::BoopRejected {
        boop_id: 1_001,
        cooldown_ms: 59_950,
    };
    let text = frame.encode();
    assert_eq!(text, format!("r{},{}", base36::encode(1_001), "1a9a"));
    assert_eq!(ServerFrame::decode(&text), Ok(frame));
}

#[test]
fn cooldown_reply_field_omission_is_zero() {
    assert_eq!(
        ServerFrame::decode("d1"),
        Ok(ServerFrame::CooldownReply { query_id: 1, cooldown_ms: 0 })
    );
}

#[test]
fn hour_long_cooldown_fits_the_width_limit() {
    let text = base36::encode(3_600_000);
    assert!(text.len() <= base36::MAX_DIGITS);
    assert_eq!(base36::decode(&text), Ok(3_600_000));
}

#[test]
fn decode_never_yields_partial_values() {
    // A reject with one good and one bad field fails as a whole.
    assert!(ServerFrame::decode("r1,").is_err());
    assert!(ServerFrame::decode("r,1").is_err());
    assert!(ServerFrame::decode("d1,UP").is_err());
}
