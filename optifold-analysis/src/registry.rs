//! Named algorithm factories, so a front end can choose what to run by name.

use std::path::Path;

use log::debug;

use crate::algorithm::{boxed, AlgorithmRef};
use crate::algs::{BasicHist, Noop, Resolution, SelectionTables, Timestamp};
use crate::error::{Error, Result};
use crate::event::EventRecord;

type Factory<R> = Box<dyn Fn(&Path) -> AlgorithmRef<R> + Send + Sync>;

/// Ordered mapping from name to a factory receiving the output directory
pub struct Registry<R> {
    entries: Vec<(String, Factory<R>)>
}

impl <R: 'static> Default for Registry<R> {
    fn default() -> Self {
        Registry { entries: Vec::new() }
    }
}

impl <R: 'static> Registry<R> {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Adds a factory, replacing any registered under the same name.
    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
        where F: Fn(&Path) -> AlgorithmRef<R> + Send + Sync + 'static
    {
        let factory: Factory<R> = Box::new(factory);
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((name.to_owned(), factory))
        }
        self
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn create(&self, name: &str, output: &Path) -> Result<AlgorithmRef<R>> {
        self.entries.iter()
            .find(|(n, _)| n == name)
            .map(|(_, factory)| factory(output))
            .ok_or_else(|| Error::UnknownAlgorithm {
                name: name.to_owned(),
                valid: self.names().into_iter().map(String::from).collect()
            })
    }

    /// Instantiates a comma separated list of names, in the order given.
    /// `None` instantiates everything in registration order.
    ///
    /// ```rust
    /// use std::path::Path;
    /// use optifold_analysis::registry::standard_registry;
    ///
    /// let registry = standard_registry();
    /// let algs = registry.resolve(Some("basichist, test"), Path::new("plots")).unwrap();
    /// assert_eq!(algs.iter().map(|a| a.name()).collect::<Vec<_>>(), vec!["BasicHist", "Noop"]);
    /// assert!(registry.resolve(Some("nope"), Path::new("plots")).is_err());
    /// ```
    pub fn resolve(&self, names: Option<&str>, output: &Path) -> Result<Vec<AlgorithmRef<R>>> {
        let algs: Vec<AlgorithmRef<R>> = match names {
            None => self.entries.iter().map(|(_, factory)| factory(output)).collect(),
            Some(list) => list.split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(|n| self.create(n, output))
                .collect::<Result<Vec<_>>>()?
        };
        debug!("Resolved {} algorithms from {:?}", algs.len(), names);
        Ok(algs)
    }
}

/// The reference algorithms over `EventRecord`s
pub fn standard_registry() -> Registry<EventRecord> {
    let mut registry = Registry::new();
    registry
        .register("test", |_| boxed(Noop))
        .register("selectiontables", |output| boxed(SelectionTables::new(output)))
        .register("basichist", |output| boxed(BasicHist::new(output)))
        .register("resolution", |output| boxed(Resolution::new(output)))
        .register("timestamp", |output| boxed(Timestamp::new(output)));
    registry
}
