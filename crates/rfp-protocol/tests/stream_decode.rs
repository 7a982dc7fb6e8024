use rfp_protocol::frame::SOURCE_DEST_RF;
use rfp_protocol::{decode_frame, InfoType, RawFrame, Reassembled, Reassembler, Registry, SensorReading};

fn frame_for(info_type: InfoType, seed: u16) -> RawFrame {
    let mut payload = vec![0x00u8, 0x01, 0x00, 0xB5, 0x9C, 0x50, 0x08, info_type.code()];
    for i in 0..(info_type.infos_len() / 2) as u16 {
        let word = seed.wrapping_mul(31).wrapping_add(i.wrapping_mul(257));
        payload.extend_from_slice(&word.to_le_bytes());
    }
    RawFrame::wrap(SOURCE_DEST_RF, &payload).unwrap()
}

fn decode_all(registry: &Registry, events: Vec<Reassembled>) -> Vec<SensorReading> {
    events
        .into_iter()
        .filter_map(|e| match e {
            Reassembled::Frame(f) => decode_frame(registry, "rfp2mqtt", &f).unwrap(),
            Reassembled::Desync { .. } => None,
        })
        .collect()
}

#[test]
fn byte_at_a_time_matches_whole_frame_for_every_info_type() {
    let registry = Registry::new();
    for t in InfoType::ALL {
        let frame = frame_for(t, u16::from(t.code()) + 3);
        let whole = decode_frame(&registry, "rfp2mqtt", &frame).unwrap().unwrap();

        let mut r = Reassembler::new();
        let mut events = Vec::new();
        for b in frame.as_bytes() {
            events.extend(r.push(std::slice::from_ref(b)));
        }
        let trickled = decode_all(&registry, events);
        assert_eq!(trickled, vec![whole], "infoType {t}");
    }
}

#[test]
fn concatenated_frames_decode_in_arrival_order() {
    let registry = Registry::new();
    let a = frame_for(InfoType::OregonThermoHygro, 1);
    let b = frame_for(InfoType::Visonic, 2);
    let mut chunk = a.as_bytes().to_vec();
    chunk.extend_from_slice(b.as_bytes());

    let readings = decode_all(&registry, Reassembler::new().push(&chunk));
    assert_eq!(readings.len(), 2);
    assert_eq!(readings[0].info_type, InfoType::OregonThermoHygro);
    assert_eq!(readings[1].info_type, InfoType::Visonic);
}

#[test]
fn hundred_noise_bytes_yield_one_desync_and_no_readings() {
    let mut r = Reassembler::new();
    let events = r.push(&[0xA5; 100]);
    assert_eq!(events, vec![Reassembled::Desync { discarded: 100 }]);
    assert!(decode_all(&Registry::new(), events).is_empty());
}
