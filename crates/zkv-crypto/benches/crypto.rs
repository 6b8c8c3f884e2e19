use secrecy::SecretString;
use zkv_core::UserIdentity;
use zkv_crypto::{
    decrypt_field, derive_kek, encrypt_field, generate_dek, unwrap_dek, wrap_dek, FieldRole,
    KdfParams,
};

fn make_text(size: usize) -> String {
    (0..size)
        .map(|i| char::from(b'a' + ((i.wrapping_mul(7) ^ (i >> 3)) % 26) as u8))
        .collect()
}

#[divan::bench(args = [16, 256, 4096])]
fn bench_encrypt_field(bencher: divan::Bencher, size: usize) {
    let dek = generate_dek();
    let aad = FieldRole::Password.aad(&UserIdentity::new("bench").unwrap());
    let text = make_text(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            encrypt_field(
                divan::black_box(&text),
                divan::black_box(&dek),
                divan::black_box(&aad),
            )
            .unwrap()
        });
}

#[divan::bench(args = [16, 256, 4096])]
fn bench_decrypt_field(bencher: divan::Bencher, size: usize) {
    let dek = generate_dek();
    let aad = FieldRole::Password.aad(&UserIdentity::new("bench").unwrap());
    let encrypted = encrypt_field(&make_text(size), &dek, &aad).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            decrypt_field(
                divan::black_box(&encrypted),
                divan::black_box(&dek),
                divan::black_box(&aad),
            )
            .unwrap()
        });
}

#[divan::bench(args = [10_000, 200_000])]
fn bench_derive_kek(bencher: divan::Bencher, iterations: u32) {
    let passphrase = SecretString::from("Tr0ub4dor&3");
    let user = UserIdentity::new("user-42").unwrap();
    let params = KdfParams { iterations };
    bencher.bench(|| derive_kek(&passphrase, &user, divan::black_box(&params)).unwrap());
}

#[divan::bench]
fn bench_wrap_unwrap(bencher: divan::Bencher) {
    let kek = zkv_crypto::Kek::from_bytes([42u8; zkv_crypto::KEY_SIZE]);
    let dek = generate_dek();
    let user = UserIdentity::new("bench").unwrap();
    bencher.bench(|| {
        let wrapped = wrap_dek(&kek, &dek, &user).unwrap();
        unwrap_dek(&kek, &wrapped.wrapped, &wrapped.nonce, &user).unwrap()
    });
}

fn main() {
    divan::main();
}
