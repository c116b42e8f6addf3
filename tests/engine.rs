use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::try_join_all;
use proptest::prelude::*;
use rand::{SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha20Rng;
use tessera::{
    Application, DRes, EngineConfig, Error, MacCheckPolicy, ProtocolBuilder,
    channel::{Channel, SimpleChannel},
    data_types::{AuthenticatedElement, InputMask, MacKeyShare, MultiplicationTriple, SInt},
    error::Resource,
    field::{FieldDefinition, FieldElement, MODULUS_61, SAFE_PRIME_61},
    numeric::{bit_decomposition, compare_leq},
    preprocessing::{DataSupplier, DummyDataSupplier},
    resource_pool::ResourcePool,
    run_application, simulate_application,
};

fn field() -> FieldDefinition {
    FieldDefinition::new(MODULUS_61).unwrap()
}

fn open_all(b: &mut ProtocolBuilder, values: Vec<DRes<SInt>>) -> DRes<Vec<u64>> {
    b.par(move |b| Ok(DRes::all(values.iter().map(|v| b.open(v)).collect())))
        .map(|opened| opened.iter().map(FieldElement::value).collect())
}

async fn run_parties<A: Application, S: DataSupplier + 'static>(
    apps: &[A],
    suppliers: Vec<S>,
    config: EngineConfig,
) -> Result<Vec<A::Output>, Error> {
    let n = apps.len();
    let channels = SimpleChannel::channels(n);
    try_join_all(
        apps.iter()
            .zip(suppliers)
            .zip(&channels)
            .enumerate()
            .map(async |(i, ((app, supplier), channel))| {
                let pool = ResourcePool::new(i, n, field(), supplier)?;
                run_application(app, pool, channel, &config).await
            }),
    )
    .await
}

/// `x` is provided by party 0, `y` by party 1.
struct Compare {
    x: Option<u64>,
    y: Option<u64>,
}

impl Application for Compare {
    type Output = Vec<u64>;

    fn build(&self, b: &mut ProtocolBuilder) -> Result<DRes<Vec<u64>>, Error> {
        let f = b.field();
        let x = b.input(self.x.map(|v| f.element(v)), 0);
        let y = b.input(self.y.map(|v| f.element(v)), 1);
        let leq = compare_leq(b, &x, &y, 8)?;
        let geq = compare_leq(b, &y, &x, 8)?;
        let results = vec![leq.map(|s| s.as_sint()), geq.map(|s| s.as_sint())];
        Ok(open_all(b, results))
    }
}

#[test]
fn compare_two_private_inputs() -> Result<(), Error> {
    for (x, y, expected) in [(3, 5, vec![1, 0]), (5, 3, vec![0, 1]), (200, 200, vec![1, 1])] {
        let apps = [
            Compare {
                x: Some(x),
                y: None,
            },
            Compare {
                x: None,
                y: Some(y),
            },
        ];
        let outputs = simulate_application(&apps, field(), &EngineConfig::default(), [3; 32])?;
        assert_eq!(outputs, vec![expected.clone(), expected], "{x} <= {y}");
    }
    Ok(())
}

#[test]
fn compare_over_a_safe_prime_field() -> Result<(), Error> {
    let field = FieldDefinition::new(SAFE_PRIME_61)?;
    for max_batch_size in [1, 3, 4096] {
        let config = EngineConfig {
            max_batch_size,
            ..EngineConfig::default()
        };
        for (x, y, expected) in [(3, 5, vec![1, 0]), (5, 3, vec![0, 1])] {
            let apps = [
                Compare {
                    x: Some(x),
                    y: None,
                },
                Compare {
                    x: None,
                    y: Some(y),
                },
            ];
            let outputs = simulate_application(&apps, field, &config, [5; 32])?;
            assert_eq!(outputs, vec![expected.clone(), expected], "{x} <= {y}");
        }
    }
    Ok(())
}

struct Arithmetic {
    x: Option<u64>,
    y: Option<u64>,
}

impl Application for Arithmetic {
    type Output = Vec<u64>;

    fn build(&self, b: &mut ProtocolBuilder) -> Result<DRes<Vec<u64>>, Error> {
        let f = b.field();
        let x = b.input(self.x.map(|v| f.element(v)), 0);
        let y = b.input(self.y.map(|v| f.element(v)), 1);
        let sum = b.add(&x, &y);
        let product = b.mult(&x, &y);
        let diff = b.sub(&x, &y);
        let scaled = b.mult_const(f.element(3), &diff);
        let shifted = b.add_constant(f.element(10), &scaled);
        Ok(open_all(b, vec![sum, product, shifted]))
    }
}

fn arithmetic_apps(n: usize, x: u64, y: u64) -> Vec<Arithmetic> {
    (0..n)
        .map(|i| Arithmetic {
            x: (i == 0).then_some(x),
            y: (i == 1).then_some(y),
        })
        .collect()
}

fn expected_arithmetic(x: u64, y: u64) -> Vec<u64> {
    let f = field();
    let (x, y) = (f.element(x), f.element(y));
    vec![
        (x + y).value(),
        (x * y).value(),
        (f.element(10) + f.element(3) * (x - y)).value(),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn arithmetic_is_homomorphic(x in 0..MODULUS_61, y in 0..MODULUS_61, n in 2usize..4) {
        let outputs = simulate_application(
            &arithmetic_apps(n, x, y),
            field(),
            &EngineConfig::default(),
            [5; 32],
        ).unwrap();
        for output in outputs {
            prop_assert_eq!(output, expected_arithmetic(x, y));
        }
    }
}

#[tokio::test]
async fn arithmetic_with_ot_preprocessing() -> Result<(), Error> {
    use tessera::{
        ot::OtConfig,
        preprocessing::{PreprocessingAmounts, generate_preprocessing},
    };

    let n = 2;
    let amounts = PreprocessingAmounts {
        triples: 1,
        input_masks: vec![1, 1],
        ..PreprocessingAmounts::default()
    };
    let channels = SimpleChannel::channels(n);
    let suppliers = try_join_all(channels.iter().enumerate().map(async |(i, channel)| {
        let mut rng = ChaCha20Rng::from_os_rng();
        generate_preprocessing(channel, i, n, field(), &amounts, OtConfig::default(), &mut rng)
            .await
    }))
    .await?;
    let outputs = run_parties(
        &arithmetic_apps(n, 1234, 5678),
        suppliers,
        EngineConfig::default(),
    )
    .await?;
    for output in outputs {
        assert_eq!(output, expected_arithmetic(1234, 5678));
    }
    Ok(())
}

/// Applies one private permutation per party to a list provided by party 0.
struct Shuffle {
    data: Option<Vec<u64>>,
    permutation: Vec<usize>,
}

const ROWS: usize = 8;

impl Application for Shuffle {
    type Output = Vec<u64>;

    fn build(&self, b: &mut ProtocolBuilder) -> Result<DRes<Vec<u64>>, Error> {
        let f = b.field();
        let me = b.my_id();
        let data = self.data.clone();
        let rows = b.par(move |b| {
            let inputs = (0..ROWS)
                .map(|i| b.input(data.as_ref().map(|d| f.element(d[i])), 0))
                .collect();
            Ok(DRes::all(inputs))
        });
        let mut current: Vec<DRes<SInt>> = (0..ROWS).map(|i| rows.map(move |r| r[i])).collect();
        for p in 0..b.no_of_parties() {
            let permutation = self.permutation.clone();
            // one-hot matrix with m[i][j] = 1 iff row j moves to row i
            let matrix = b.par(move |b| {
                let entries = (0..ROWS * ROWS)
                    .map(|k| {
                        let (i, j) = (k / ROWS, k % ROWS);
                        let entry = (me == p).then(|| f.element((permutation[j] == i) as u64));
                        b.input(entry, p)
                    })
                    .collect();
                Ok(DRes::all(entries))
            });
            let values = current.clone();
            let products = b.par(move |b| {
                let matrix = matrix.out();
                let products = (0..ROWS * ROWS)
                    .map(|k| b.mult(&DRes::ready(matrix[k]), &values[k % ROWS]))
                    .collect();
                Ok(DRes::all(products))
            });
            current = (0..ROWS)
                .map(|i| {
                    let terms = (0..ROWS)
                        .map(|j| (f.one(), products.map(move |p| p[i * ROWS + j])))
                        .collect();
                    b.linear_combination(f.zero(), terms)
                })
                .collect();
        }
        Ok(open_all(b, current))
    }
}

#[test]
fn three_party_shuffle_matches_clear_text() -> Result<(), Error> {
    let data: Vec<u64> = (0..ROWS as u64).map(|i| 100 + i * i).collect();
    let permutations: Vec<Vec<usize>> = (0..3u8)
        .map(|p| {
            let mut perm: Vec<usize> = (0..ROWS).collect();
            perm.shuffle(&mut ChaCha20Rng::from_seed([p; 32]));
            perm
        })
        .collect();
    let mut expected = data.clone();
    for perm in &permutations {
        let mut next = vec![0; ROWS];
        for (j, v) in expected.iter().enumerate() {
            next[perm[j]] = *v;
        }
        expected = next;
    }
    let apps: Vec<Shuffle> = permutations
        .into_iter()
        .enumerate()
        .map(|(p, permutation)| Shuffle {
            data: (p == 0).then(|| data.clone()),
            permutation,
        })
        .collect();
    let outputs = simulate_application(&apps, field(), &EngineConfig::default(), [9; 32])?;
    for output in outputs {
        assert_eq!(output, expected);
    }
    Ok(())
}

struct Decompose(Option<u64>);

impl Application for Decompose {
    type Output = Vec<u64>;

    fn build(&self, b: &mut ProtocolBuilder) -> Result<DRes<Vec<u64>>, Error> {
        let f = b.field();
        let x = b.input(self.0.map(|v| f.element(v)), 1);
        let bits = bit_decomposition(b, &x, 8)?;
        let bits: Vec<DRes<SInt>> = (0..8).map(|i| bits.map(move |v| v[i].as_sint())).collect();
        Ok(open_all(b, bits))
    }
}

#[test]
fn decomposes_into_bits() -> Result<(), Error> {
    let apps = [Decompose(None), Decompose(Some(0b1011_0110)), Decompose(None)];
    let outputs = simulate_application(&apps, field(), &EngineConfig::default(), [1; 32])?;
    for output in outputs {
        assert_eq!(output, vec![0, 1, 1, 0, 1, 1, 0, 1]);
    }
    Ok(())
}

/// Adds one to the `c` share of every triple of party 0.
struct CorruptTriples(DummyDataSupplier);

impl DataSupplier for CorruptTriples {
    fn mac_key_share(&self) -> MacKeyShare {
        self.0.mac_key_share()
    }

    fn next_triple(&mut self) -> Result<MultiplicationTriple, Error> {
        let t = self.0.next_triple()?;
        let c = t.c();
        let one = c.share().field().one();
        let c = AuthenticatedElement::new(c.share() + one, c.mac());
        Ok(MultiplicationTriple::new(t.a(), t.b(), c))
    }

    fn next_input_mask(&mut self, owner: usize) -> Result<InputMask, Error> {
        self.0.next_input_mask(owner)
    }

    fn next_bit(&mut self) -> Result<AuthenticatedElement, Error> {
        self.0.next_bit()
    }

    fn next_random_element(&mut self) -> Result<AuthenticatedElement, Error> {
        self.0.next_random_element()
    }
}

enum Supplier {
    Honest(DummyDataSupplier),
    Corrupt(CorruptTriples),
}

impl DataSupplier for Supplier {
    fn mac_key_share(&self) -> MacKeyShare {
        match self {
            Supplier::Honest(s) => s.mac_key_share(),
            Supplier::Corrupt(s) => s.mac_key_share(),
        }
    }

    fn next_triple(&mut self) -> Result<MultiplicationTriple, Error> {
        match self {
            Supplier::Honest(s) => s.next_triple(),
            Supplier::Corrupt(s) => s.next_triple(),
        }
    }

    fn next_input_mask(&mut self, owner: usize) -> Result<InputMask, Error> {
        match self {
            Supplier::Honest(s) => s.next_input_mask(owner),
            Supplier::Corrupt(s) => s.next_input_mask(owner),
        }
    }

    fn next_bit(&mut self) -> Result<AuthenticatedElement, Error> {
        match self {
            Supplier::Honest(s) => s.next_bit(),
            Supplier::Corrupt(s) => s.next_bit(),
        }
    }

    fn next_random_element(&mut self) -> Result<AuthenticatedElement, Error> {
        match self {
            Supplier::Honest(s) => s.next_random_element(),
            Supplier::Corrupt(s) => s.next_random_element(),
        }
    }
}

fn suppliers(n: usize, corrupt: Option<usize>) -> Vec<Supplier> {
    (0..n)
        .map(|i| {
            let dummy = DummyDataSupplier::new(i, n, field(), [4; 32]).unwrap();
            if corrupt == Some(i) {
                Supplier::Corrupt(CorruptTriples(dummy))
            } else {
                Supplier::Honest(dummy)
            }
        })
        .collect()
}

#[tokio::test]
async fn corrupted_triple_is_detected_by_mac_check() {
    for n in [2, 3] {
        let result = run_parties(
            &arithmetic_apps(n, 6, 7),
            suppliers(n, Some(0)),
            EngineConfig::default(),
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.is_malicious(), "{n} parties: {err}");
    }
}

#[tokio::test]
async fn periodic_mac_checks_keep_results() -> Result<(), Error> {
    let config = EngineConfig {
        mac_check: MacCheckPolicy::EveryNOpenings(1),
        ..EngineConfig::default()
    };
    let outputs = run_parties(&arithmetic_apps(3, 6, 7), suppliers(3, None), config).await?;
    for output in outputs {
        assert_eq!(output, expected_arithmetic(6, 7));
    }
    let result = run_parties(&arithmetic_apps(3, 6, 7), suppliers(3, Some(2)), config).await;
    assert!(matches!(result, Err(Error::MaliciousBehavior(_))));
    Ok(())
}

#[tokio::test]
async fn missing_triples_are_reported() {
    let apps = arithmetic_apps(2, 1, 2);
    let limited: Vec<DummyDataSupplier> = (0..2)
        .map(|i| {
            DummyDataSupplier::new(i, 2, field(), [0; 32])
                .unwrap()
                .with_triple_limit(0)
        })
        .collect();
    let result = run_parties(&apps, limited, EngineConfig::default()).await;
    assert!(matches!(
        result,
        Err(Error::ResourceExhausted(Resource::Triple))
    ));
}

struct Announce;

impl Application for Announce {
    type Output = Vec<Vec<u8>>;

    fn build(&self, b: &mut ProtocolBuilder) -> Result<DRes<Vec<Vec<u8>>>, Error> {
        let payload = vec![b.my_id() as u8; 4];
        Ok(b.broadcast(DRes::ready(payload)))
    }
}

/// Flips the last byte of the first message sent to `victim`.
struct Equivocate {
    inner: SimpleChannel,
    victim: usize,
    sent: AtomicUsize,
}

impl Channel for Equivocate {
    type SendError = <SimpleChannel as Channel>::SendError;
    type RecvError = <SimpleChannel as Channel>::RecvError;

    async fn send_bytes_to(&self, party: usize, mut msg: Vec<u8>) -> Result<(), Self::SendError> {
        if party == self.victim && self.sent.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(last) = msg.last_mut() {
                *last ^= 0xff;
            }
        }
        self.inner.send_bytes_to(party, msg).await
    }

    async fn recv_bytes_from(&self, party: usize) -> Result<Vec<u8>, Self::RecvError> {
        self.inner.recv_bytes_from(party).await
    }
}

async fn run_broadcast(victim: Option<usize>) -> Result<Vec<Vec<Vec<u8>>>, Error> {
    let n = 3;
    let channels: Vec<Equivocate> = SimpleChannel::channels(n)
        .into_iter()
        .map(|inner| Equivocate {
            inner,
            victim: victim.unwrap_or(usize::MAX),
            sent: AtomicUsize::new(0),
        })
        .collect();
    try_join_all(channels.iter().enumerate().map(async |(i, channel)| {
        let supplier = DummyDataSupplier::new(i, n, field(), [2; 32])?;
        let pool = ResourcePool::new(i, n, field(), supplier)?;
        // only party 0 equivocates
        if i == 0 {
            run_application(&Announce, pool, channel, &EngineConfig::default()).await
        } else {
            run_application(&Announce, pool, &channel.inner, &EngineConfig::default()).await
        }
    }))
    .await
}

#[tokio::test]
async fn broadcast_delivers_every_payload() -> Result<(), Error> {
    let outputs = run_broadcast(None).await?;
    let expected: Vec<Vec<u8>> = (0..3).map(|p| vec![p as u8; 4]).collect();
    for output in outputs {
        assert_eq!(output, expected);
    }
    Ok(())
}

#[tokio::test]
async fn equivocating_broadcast_is_detected() {
    let result = run_broadcast(Some(2)).await;
    assert!(matches!(result, Err(Error::MaliciousBehavior(_))));
}

struct Oversized;

impl Application for Oversized {
    type Output = Vec<Vec<u8>>;

    fn build(&self, b: &mut ProtocolBuilder) -> Result<DRes<Vec<Vec<u8>>>, Error> {
        Ok(b.broadcast(DRes::ready(vec![0; 1 << 16])))
    }
}

#[test]
fn broadcast_payloads_must_fit_the_length_prefix() {
    let result = simulate_application(
        &[Oversized, Oversized, Oversized],
        field(),
        &EngineConfig::default(),
        [6; 32],
    );
    assert!(matches!(result, Err(Error::Invariant(_))));
}
