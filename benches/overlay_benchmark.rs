use criterion::{criterion_group, criterion_main, Criterion};
use overlay_rust::{
    crypto::{open, seal},
    keypair::Keypair,
    networking::contact::Contact,
    networking::message_types::store_message::StoreRequest,
    networking::packet::{Packet, Payload},
    Identifier,
};

fn sample_packet() -> Packet {
    let sender = Contact::new(
        Identifier::random(),
        "overlay",
        "127.0.0.1".parse().unwrap(),
        5353,
    );
    let body = StoreRequest::Put {
        token_id: 42,
        key: Identifier::from_data(b"example.org"),
        value: Some(vec![7; 512]),
    }
    .serialize();
    Packet::new(
        sender,
        Payload::Data {
            consumer: String::from("store"),
            body,
        },
    )
}

fn bench_packet_serialize(c: &mut Criterion) {
    let packet = sample_packet();
    c.bench_function("packet serialization", |b| b.iter(|| packet.serialize()));
}

fn bench_packet_deserialize(c: &mut Criterion) {
    let bytes = sample_packet().serialize();
    c.bench_function("packet deserialization", |b| {
        b.iter(|| Packet::deserialize(&bytes).unwrap())
    });
}

fn bench_seal_open(c: &mut Criterion) {
    let keypair = Keypair::new();
    let data = vec![3u8; 16 * 1024];
    let sealed = seal(&data, keypair.public_key()).unwrap();

    c.bench_function("seal 16k", |b| {
        b.iter(|| seal(&data, keypair.public_key()).unwrap())
    });
    c.bench_function("open 16k", |b| {
        b.iter(|| open(&sealed, keypair.secret_key()).unwrap())
    });
}

criterion_group!(
    benches,
    bench_packet_serialize,
    bench_packet_deserialize,
    bench_seal_open
);
criterion_main!(benches);
