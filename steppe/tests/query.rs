mod support;

use mongodb::bson::{Bson, doc};
use steppe::{Config, Error, ExtraFields, Expression, Order, Record, Session};
use support::{FakeSession, Person, T, T2, address, person, t, t2, t_document};

#[test]
fn empty_query() {
    let session = FakeSession::new();
    let query = session.query::<T>();

    assert_eq!(query.query_document(), doc! {});
    assert!(query.projection().is_none());

    let command = query.command();
    assert_eq!(command.collection, "t");
    assert_eq!(command.limit, None);
}

#[test]
fn typed_filters_compile_to_wire_names() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query
        .filter(t::i().eq(3).unwrap())
        .unwrap()
        .filter(t::a().gt(4).unwrap())
        .unwrap();

    assert_eq!(query.query_document(), doc! { "i": 3, "aa": { "$gt": 4 } });
}

#[test]
fn comparisons_on_one_field_merge() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query
        .filter(t::i().gt(1).unwrap())
        .unwrap()
        .filter(t::i().lt(5).unwrap())
        .unwrap();

    assert_eq!(query.query_document(), doc! { "i": { "$gt": 1, "$lt": 5 } });
}

#[test]
fn repeated_equality_is_rejected_atomically() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();
    query.filter(t::i().eq(3).unwrap()).unwrap();

    let err = query.filter(t::i().eq(4).unwrap()).unwrap_err();

    assert!(matches!(err, Error::MixedAssignment(ref key) if key == "i"));
    assert!(err.is_construction());
    assert_eq!(query.query_document(), doc! { "i": 3 });
}

#[test]
fn failing_conjunction_leaves_query_unchanged() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();
    query.filter(t::i().eq(3).unwrap()).unwrap();

    let conjunction = Expression::Match(doc! { "j": 1, "i": { "$gt": 0 } });
    assert!(query.filter(conjunction).is_err());

    assert_eq!(query.query_document(), doc! { "i": 3 });
}

#[test]
fn string_names_resolve_through_nested_documents() {
    let session = FakeSession::new();
    let mut query = session.query::<T2>();

    query.filter_raw(doc! { "t.a": 5 }).unwrap();
    query.ascending("t.i").unwrap();

    assert_eq!(query.query_document(), doc! { "t.aa": 5 });
    assert_eq!(query.sort_keys(), [("t.i".to_owned(), Order::Asc)]);
}

#[test]
fn unknown_names_are_rejected() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    assert!(matches!(
        query.filter_raw(doc! { "q": 1 }),
        Err(Error::NoSuchField { document: "T", .. })
    ));
    assert!(matches!(
        query.ascending("i.q"),
        Err(Error::NoSuchField { .. })
    ));
    assert!(query.fields(["i", "nope"]).is_err());
    assert!(query.projection().is_none());
}

#[test]
fn raw_filters_keep_operators() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query
        .filter_raw(doc! { "i": { "$gt": 1 }, "$where": "true" })
        .unwrap();

    assert_eq!(
        query.query_document(),
        doc! { "i": { "$gt": 1 }, "$where": "true" }
    );
}

#[test]
fn filter_by_takes_plain_names_only() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query.filter_by([("i", 3), ("a", 4)]).unwrap();
    assert_eq!(query.query_document(), doc! { "i": 3, "aa": 4 });

    let mut nested = session.query::<T2>();
    assert!(matches!(
        nested.filter_by([("t.i", 3)]),
        Err(Error::NoSuchField { .. })
    ));
    assert!(nested.filter_by([("$or", 3)]).is_err());
}

#[test]
fn or_combines_into_one_disjunction() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query
        .or_([
            t::i().eq(3).unwrap(),
            t::i().eq(4).unwrap(),
            t::j().eq(5).unwrap(),
        ])
        .unwrap();

    assert_eq!(
        query.query_document(),
        doc! { "$or": [{ "i": 3 }, { "i": 4 }, { "j": 5 }] }
    );
}

#[test]
fn empty_or_is_a_no_op() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query.or_(Vec::new()).unwrap();

    assert_eq!(query.query_document(), doc! {});
}

#[test]
fn not_negates_each_expression() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query
        .not_([t::i().eq(3).unwrap(), t::j().gt(4).unwrap()])
        .unwrap();

    assert_eq!(
        query.query_document(),
        doc! { "i": { "$ne": 3 }, "j": { "$not": { "$gt": 4 } } }
    );
}

#[test]
fn negated_conjunctions_accumulate_in_one_nor() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query
        .not_([
            Expression::all([t::i().eq(3), t::j().eq(4)]).unwrap(),
            Expression::all([t::i().eq(5), t::j().eq(6)]).unwrap(),
        ])
        .unwrap();
    query
        .not_([t::a().eq(7).unwrap().or_with(t::a().eq(8).unwrap())])
        .unwrap();

    assert_eq!(
        query.query_document(),
        doc! {
            "$nor": [
                { "i": 3, "j": 4 },
                { "i": 5, "j": 6 },
                { "aa": 7 },
                { "aa": 8 },
            ]
        }
    );
}

#[test]
fn membership_shortcuts() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query.in_(t::i(), [1, 2, 3]).unwrap();
    query.nin("j", [Bson::Int32(4)]).unwrap();

    assert_eq!(
        query.query_document(),
        doc! { "i": { "$in": [1, 2, 3] }, "j": { "$nin": [4] } }
    );
}

#[test]
fn duplicate_sort_and_hint_are_rejected() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query.ascending(t::i()).unwrap().descending("j").unwrap();
    assert!(matches!(query.descending("i"), Err(Error::DuplicateSort(_))));
    assert_eq!(
        query.command().sort_document(),
        Some(doc! { "i": 1, "j": -1 })
    );

    query.hint_asc(t::i()).unwrap().hint_desc("a").unwrap();
    assert!(matches!(query.hint_desc("i"), Err(Error::DuplicateHint(_))));
    assert_eq!(
        query.hints(),
        [("i".to_owned(), Order::Asc), ("aa".to_owned(), Order::Desc)]
    );
    assert_eq!(
        query.command().hint_document(),
        Some(doc! { "i": 1, "aa": -1 })
    );
}

#[test]
fn fields_always_include_identity() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query.fields([t::i()]).unwrap();
    query.fields(["a", "i"]).unwrap();

    let projection = query.projection().unwrap();
    assert_eq!(
        projection.iter().map(String::as_str).collect::<Vec<_>>(),
        ["_id", "aa", "i"]
    );
    assert_eq!(query.field_order(), ["i", "aa"]);
}

#[test]
fn clones_are_independent() {
    let session = FakeSession::new();
    let mut base = session.query::<T>();
    base.filter(t::i().gt(0).unwrap()).unwrap();

    let mut derived = base.clone();
    derived.filter(t::j().eq(1).unwrap()).unwrap().limit(5);

    assert_eq!(base.query_document(), doc! { "i": { "$gt": 0 } });
    assert_eq!(base.command().limit, None);
    assert_eq!(
        derived.query_document(),
        doc! { "i": { "$gt": 0 }, "j": 1 }
    );

    base.ascending(t::i())
        .unwrap()
        .filter(t::a().lt(9).unwrap())
        .unwrap()
        .limit(2);

    assert_eq!(
        derived.query_document(),
        doc! { "i": { "$gt": 0 }, "j": 1 }
    );
    assert!(derived.sort_keys().is_empty());
    assert_eq!(derived.command().limit, Some(5));
    assert_eq!(base.sort_keys(), [("i".to_owned(), Order::Asc)]);
}

#[test]
fn filter_macro_builds_conjunction() {
    let session = FakeSession::new();
    let mut query = session.query::<T>();

    query
        .filter(t::filter! { i: Gt(1), j: 4, a: In([1, 2]) }.unwrap())
        .unwrap();

    assert_eq!(
        query.query_document(),
        doc! { "i": { "$gt": 1 }, "j": 4, "aa": { "$in": [1, 2] } }
    );
}

#[test]
fn all_materializes_objects() {
    let session = FakeSession::new().with_documents::<T>([t_document(1), t_document(2)]);

    let records = session.query::<T>().all().unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[1].get(&t::j()).unwrap(), Some(3));

    let entity = records
        .into_iter()
        .next()
        .and_then(Record::into_object)
        .unwrap()
        .into_entity()
        .unwrap();
    assert_eq!(entity.a, Some(10));
}

#[test]
fn one_checks_cardinality() {
    let session = FakeSession::new().with_documents::<T>([t_document(1), t_document(2)]);

    assert!(matches!(
        session.query::<T>().one(),
        Err(Error::MultipleResultsFound)
    ));

    let mut missing = session.query::<T>();
    missing.filter(t::i().eq(9).unwrap()).unwrap();
    let err = missing.one().unwrap_err();
    assert!(matches!(err, Error::NoResultFound));
    assert!(err.is_cardinality());

    let mut single = session.query::<T>();
    single.filter(t::i().eq(2).unwrap()).unwrap();
    assert_eq!(single.one().unwrap().get(&t::i()).unwrap(), 2);
}

#[test]
fn first_of_nothing_is_none() {
    let session = FakeSession::new();

    assert!(session.query::<T>().first().unwrap().is_none());
}

#[test]
fn skip_limit_and_indexing() {
    let session =
        FakeSession::new().with_documents::<T>((1..=5).map(t_document).collect::<Vec<_>>());
    let mut query = session.query::<T>();
    query.skip(1).limit(2);

    let values = query
        .all()
        .unwrap()
        .iter()
        .map(|record| record.get(&t::i()).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(values, [2, 3]);

    assert_eq!(query.get(1).unwrap().unwrap().get(&t::i()).unwrap(), 3);
    assert!(query.get(2).unwrap().is_none());

    assert_eq!(query.count(true).unwrap(), 2);
    assert_eq!(query.count(false).unwrap(), 5);
}

#[test]
fn zero_limit_means_no_limit() {
    let session = FakeSession::new().with_documents::<T>([t_document(1), t_document(2)]);
    let mut query = session.query::<T>();
    query.limit(0);

    assert_eq!(query.all().unwrap().len(), 2);
}

#[test]
fn results_can_be_rewound_and_cloned() {
    let session = FakeSession::new().with_documents::<T>([t_document(1), t_document(2)]);
    let mut results = session.query::<T>().iter().unwrap();

    assert!(results.next().is_some());
    let mut copy = results.try_clone().unwrap();
    assert_eq!(copy.next().unwrap().unwrap().get(&t::i()).unwrap(), 2);

    results.rewind();
    assert_eq!(results.next().unwrap().unwrap().get(&t::i()).unwrap(), 1);
}

#[test]
fn projected_objects_refuse_unretrieved_fields() {
    let session = FakeSession::new().with_documents::<T>([t_document(1)]);
    let mut query = session.query::<T>();
    query.fields([t::i()]).unwrap();

    let record = query.one().unwrap();

    assert_eq!(record.get(&t::i()).unwrap(), 1);
    assert!(matches!(
        record.get(&t::j()),
        Err(Error::FieldNotRetrieved(_))
    ));
    assert_eq!(
        session.last_find().projection,
        Some(vec!["_id".to_owned(), "i".to_owned()])
    );
}

#[test]
fn values_only_returns_requested_order() {
    let session = FakeSession::new().with_documents::<T>([t_document(1)]);
    let mut query = session.query::<T>();
    query.values_only([steppe::FieldPath::from(t::a()), steppe::FieldPath::from(t::i())]).unwrap();

    let (a, i): (i32, i32) = query
        .one()
        .unwrap()
        .into_values()
        .unwrap()
        .into_tuple()
        .unwrap();

    assert_eq!((a, i), (10, 1));
}

#[test]
fn raw_output_wins() {
    let session = FakeSession::new().with_documents::<T>([doc! { "_id": 1, "q": "extra" }]);
    let mut query = session.query::<T>();
    query.values_only(["i"]).unwrap().raw_output();

    let record = session.query::<T>().raw_output().one().unwrap();
    assert_eq!(record.into_raw().unwrap().get_str("q").unwrap(), "extra");

    assert!(query.is_raw_output());
    assert!(query.one().unwrap().into_raw().is_some());
}

#[test]
fn extra_fields_fail_materialization() {
    let raw = doc! { "_id": 1, "i": 1, "q": "extra" };

    let strict = FakeSession::new().with_documents::<T>([raw.clone()]);
    assert!(matches!(
        strict.query::<T>().one(),
        Err(Error::ExtraValue { .. })
    ));

    let lenient = FakeSession::with_config(Config {
        extra_fields: ExtraFields::Ignore,
        ..Config::default()
    })
    .with_documents::<T>([raw]);
    assert_eq!(lenient.query::<T>().one().unwrap().get(&t::i()).unwrap(), 1);
}

#[test]
fn distinct_and_explain() {
    let session = FakeSession::new().with_documents::<Person>([
        doc! { "_id": 1, "name": "a", "yrs": 30, "previous": [], "tags": [] },
        doc! { "_id": 2, "name": "b", "yrs": 30, "previous": [], "tags": [] },
        doc! { "_id": 3, "name": "c", "yrs": 40, "previous": [], "tags": [] },
    ]);

    let ages = session.query::<Person>().distinct(person::age()).unwrap();
    assert_eq!(ages, [Bson::Int32(30), Bson::Int32(40)]);

    let mut query = session.query::<Person>();
    query.filter(person::name().eq("a").unwrap()).unwrap();
    assert_eq!(
        query.explain().unwrap(),
        doc! { "collection": "people", "filter": { "name": "a" } }
    );
}

#[test]
fn nested_typed_fields() {
    let session = FakeSession::new().with_documents::<Person>([doc! {
        "_id": 1,
        "name": "a",
        "yrs": 30,
        "address": { "city": "Oslo" },
        "previous": [],
        "tags": [],
    }]);

    let city = person::address().then(&address::city());
    let mut query = session.query::<Person>();
    query.filter(city.eq("Oslo").unwrap()).unwrap();

    assert_eq!(query.query_document(), doc! { "address.city": "Oslo" });

    let record = query.one().unwrap();
    assert_eq!(record.get(&city).unwrap(), "Oslo");

    let loaded = record.into_object().unwrap();
    let home = loaded.embedded(&person::address()).unwrap();
    assert_eq!(home.get(&address::city()).unwrap(), "Oslo");
    assert!(home.get(&address::zip()).is_err());
    assert_eq!(loaded.into_entity().unwrap().address.unwrap().city, "Oslo");
}

#[test]
fn nested_partial_projection() {
    let session = FakeSession::new().with_documents::<T2>([doc! {
        "_id": 1,
        "t": { "_id": 2, "i": 3, "j": 4 },
    }]);
    let mut query = session.query::<T2>();
    query.fields([t2::t().then(&t::i())]).unwrap();

    let record = query.one().unwrap();

    assert_eq!(record.get(&t2::t().then(&t::i())).unwrap(), 3);
    assert!(record.get(&t2::t().then(&t::j())).is_err());
}
