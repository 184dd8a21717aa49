//! Preparation: static storage, field layout and dispatch table.
//!
//! Runs once per record, after verification, with the supertype and all
//! superinterfaces already prepared. Nothing here executes code from the type:
//! static fields receive their zero-equivalent default, or their compile-time
//! constant when they declare one.

use crate::{
    typesystem::{
        DispatchEntry, DispatchTable, FieldLayout, MethodImpl, TypeRecordRc, TypeRecordRef, Value,
    },
    Error, Result,
};

/// Prepare `record`.
///
/// # Errors
/// Returns [`Error::PreparationFailure`] if a constant cannot be stored in its
/// field (only reachable with verification disabled).
pub(crate) fn prepare(record: &TypeRecordRc) -> Result<()> {
    allocate_statics(record)?;
    record.set_layout(build_layout(record));
    record.set_dispatch_table(build_dispatch_table(record));
    Ok(())
}

fn allocate_statics(record: &TypeRecordRc) -> Result<()> {
    let mut slots = Vec::new();
    for field in record.descriptor().fields.iter().filter(|f| f.is_static()) {
        let value = match &field.constant {
            Some(constant) if constant.fits(&field.field_type) => constant.clone(),
            Some(constant) => {
                return Err(Error::PreparationFailure {
                    identity: record.identity().clone(),
                    message: format!(
                        "constant {} cannot be stored in field '{}' of type {}",
                        constant, field.name, field.field_type
                    ),
                })
            }
            None => Value::default_for(&field.field_type),
        };
        slots.push((field.name.clone(), value));
    }

    record.statics().allocate(slots);
    Ok(())
}

fn build_layout(record: &TypeRecordRc) -> FieldLayout {
    let inherited = record
        .supertype()
        .and_then(|supertype| supertype.layout().map(|layout| layout.instance_size))
        .unwrap_or(0);

    let mut next_static = 0;
    let mut next_instance = inherited;
    let slots = record
        .descriptor()
        .fields
        .iter()
        .map(|field| {
            let counter = if field.is_static() {
                &mut next_static
            } else {
                &mut next_instance
            };
            let slot = *counter;
            *counter += 1;
            slot
        })
        .collect();

    FieldLayout {
        slots,
        instance_size: next_instance,
    }
}

fn build_dispatch_table(record: &TypeRecordRc) -> DispatchTable {
    let supertype = if record.is_interface() {
        None
    } else {
        record.supertype()
    };
    let mut table = DispatchTable::inherit(supertype.as_ref().and_then(|s| s.dispatch_table()));

    let own = TypeRecordRef::new(record);
    for (index, method) in record.descriptor().methods.iter().enumerate() {
        if !method.is_virtual() {
            continue;
        }
        table.define(DispatchEntry {
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            implementation: (!method.is_abstract()).then(|| MethodImpl {
                declarer: own.clone(),
                index,
            }),
        });
    }

    if !record.is_interface() {
        for interface in record.superinterfaces() {
            let declarer = TypeRecordRef::new(&interface);
            for (index, method) in interface.descriptor().methods.iter().enumerate() {
                if !method.is_virtual() || method.is_abstract() || method.body.is_none() {
                    continue;
                }
                inherit_default(
                    &mut table,
                    &interface,
                    DispatchEntry {
                        name: method.name.clone(),
                        descriptor: method.descriptor.clone(),
                        implementation: Some(MethodImpl {
                            declarer: declarer.clone(),
                            index,
                        }),
                    },
                );
            }
        }
    }

    table
}

/// A default method fills an empty or abstract slot, and replaces a default
/// inherited from one of its own superinterfaces. Class implementations always win.
fn inherit_default(table: &mut DispatchTable, interface: &TypeRecordRc, entry: DispatchEntry) {
    let more_specific = table
        .slot_of(&entry.name, &entry.descriptor)
        .and_then(|slot| table.entry(slot))
        .and_then(|existing| existing.implementation.as_ref())
        .and_then(|existing| existing.declarer.upgrade())
        .is_some_and(|current| {
            current.is_interface()
                && current.identity() != interface.identity()
                && interface.is_assignable_to(&current)
        });

    if more_specific {
        table.define(entry);
    } else {
        table.define_if_absent(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{record_of, TestLoaders},
        typesystem::{ClassBuilder, FieldFlags},
    };

    #[test]
    fn test_statics_and_constants() {
        let loaders = TestLoaders::new();
        let record = record_of(
            &loaders.app,
            ClassBuilder::class("demo.A")
                .static_constant("MAX", "I", Value::Int(7))
                .static_constant("NAME", "Ljava.lang.String;", Value::from("a"))
                .static_field("count", "J")
                .static_field("peer", "Ldemo.B;")
                .field("x", "I")
                .build()
                .unwrap(),
        );

        prepare(&record).unwrap();
        let statics = record.statics();
        assert_eq!(statics.len(), 4);
        assert_eq!(statics.get_by_name("MAX"), Some(Value::Int(7)));
        assert_eq!(statics.get_by_name("NAME"), Some(Value::from("a")));
        assert_eq!(statics.get_by_name("count"), Some(Value::Long(0)));
        assert_eq!(statics.get_by_name("peer"), Some(Value::Null));
        assert_eq!(statics.get_by_name("x"), None);

        let layout = record.layout().unwrap();
        assert_eq!(layout.slots, vec![0, 1, 2, 3, 0]);
        assert_eq!(layout.instance_size, 1);
    }

    #[test]
    fn test_mismatched_constant_fails_preparation() {
        let loaders = TestLoaders::new();
        let record = record_of(
            &loaders.app,
            ClassBuilder::class("demo.A")
                .field_with(
                    "X",
                    "I",
                    FieldFlags::STATIC,
                    Some(Value::from("not an int")),
                )
                .build()
                .unwrap(),
        );

        assert!(matches!(
            prepare(&record),
            Err(Error::PreparationFailure { .. })
        ));
    }

    #[test]
    fn test_dispatch_table_inheritance() {
        let loaders = TestLoaders::new();
        let base = record_of(
            &loaders.app,
            ClassBuilder::class("demo.Base")
                .method("run", "()V", vec![0])
                .method("stop", "()V", vec![0])
                .constructor()
                .build()
                .unwrap(),
        );
        base.set_hierarchy(None, &[]);
        prepare(&base).unwrap();

        let derived = record_of(
            &loaders.app,
            ClassBuilder::class("demo.Derived")
                .extends("demo.Base")
                .method("stop", "()V", vec![1])
                .method("pause", "()V", vec![1])
                .static_method("make", "()Ldemo.Derived;", vec![1])
                .field("y", "I")
                .build()
                .unwrap(),
        );
        derived.set_hierarchy(Some(&base), &[]);
        prepare(&derived).unwrap();

        let table = derived.dispatch_table().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.slot_of("run", "()V"), Some(0));
        assert_eq!(table.slot_of("stop", "()V"), Some(1));
        assert_eq!(table.slot_of("pause", "()V"), Some(2));
        assert_eq!(table.slot_of("<init>", "()V"), None);

        let stop = table.entry(1).unwrap().implementation.as_ref().unwrap();
        assert!(stop.declarer.points_to(&derived));
        let run = table.entry(0).unwrap().implementation.as_ref().unwrap();
        assert!(run.declarer.points_to(&base));
    }

    #[test]
    fn test_default_methods_fill_class_table() {
        let loaders = TestLoaders::new();
        let shape = record_of(
            &loaders.app,
            ClassBuilder::interface("demo.Shape")
                .abstract_method("area", "()D")
                .method("describe", "()V", vec![1])
                .build()
                .unwrap(),
        );
        shape.set_hierarchy(None, &[]);
        prepare(&shape).unwrap();

        let square = record_of(
            &loaders.app,
            ClassBuilder::class("demo.Square")
                .implements("demo.Shape")
                .method("area", "()D", vec![2])
                .build()
                .unwrap(),
        );
        square.set_hierarchy(None, std::slice::from_ref(&shape));
        prepare(&square).unwrap();

        let table = square.dispatch_table().unwrap();
        let describe = table.slot_of("describe", "()V").unwrap();
        let implementation = table.entry(describe).unwrap().implementation.as_ref().unwrap();
        assert!(implementation.declarer.points_to(&shape));

        let area = table.slot_of("area", "()D").unwrap();
        let implementation = table.entry(area).unwrap().implementation.as_ref().unwrap();
        assert!(implementation.declarer.points_to(&square));
    }

    #[test]
    fn test_most_specific_default_wins() {
        let loaders = TestLoaders::new();
        let greeter = record_of(
            &loaders.app,
            ClassBuilder::interface("demo.Greeter")
                .method("greet", "()V", vec![1])
                .build()
                .unwrap(),
        );
        greeter.set_hierarchy(None, &[]);
        prepare(&greeter).unwrap();

        let loud = record_of(
            &loaders.app,
            ClassBuilder::interface("demo.Loud")
                .implements("demo.Greeter")
                .method("greet", "()V", vec![2])
                .build()
                .unwrap(),
        );
        loud.set_hierarchy(None, std::slice::from_ref(&greeter));
        prepare(&loud).unwrap();

        let class = record_of(
            &loaders.app,
            ClassBuilder::class("demo.Host")
                .implements("demo.Greeter")
                .implements("demo.Loud")
                .build()
                .unwrap(),
        );
        class.set_hierarchy(None, &[greeter.clone(), loud.clone()]);
        prepare(&class).unwrap();

        let table = class.dispatch_table().unwrap();
        let slot = table.slot_of("greet", "()V").unwrap();
        let implementation = table.entry(slot).unwrap().implementation.as_ref().unwrap();
        assert!(implementation.declarer.points_to(&loud));
    }

    #[test]
    fn test_instance_layout_extends_supertype() {
        let loaders = TestLoaders::new();
        let base = record_of(
            &loaders.app,
            ClassBuilder::class("demo.Base")
                .field("a", "I")
                .field("b", "I")
                .build()
                .unwrap(),
        );
        base.set_hierarchy(None, &[]);
        prepare(&base).unwrap();

        let derived = record_of(
            &loaders.app,
            ClassBuilder::class("demo.Derived")
                .extends("demo.Base")
                .field("c", "I")
                .build()
                .unwrap(),
        );
        derived.set_hierarchy(Some(&base), &[]);
        prepare(&derived).unwrap();

        let layout = derived.layout().unwrap();
        assert_eq!(layout.slots, vec![2]);
        assert_eq!(layout.instance_size, 3);
    }
}
