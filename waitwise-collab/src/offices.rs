use log::info;
use thiserror::Error;
use waitwise_core::{authorize, Action, Actor, Coordinates, PolicyError, Resource};

use crate::{
    ActivityAction, CollabContext, DatabaseError, DepartmentData, NewDepartment, NewOffice,
    OfficeData, OfficeKind, PrimaryKey,
};

pub struct OfficeManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum OfficeError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

/// An office along with how far away it is
#[derive(Debug, Clone)]
pub struct NearbyOffice {
    pub office: OfficeData,
    pub distance_in_km: f64,
}

#[derive(Debug)]
pub struct NewPlainOffice {
    pub name: String,
    pub address: String,
    pub location: Coordinates,
    pub kind: OfficeKind,
}

impl OfficeManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn list(&self) -> Result<Vec<OfficeData>, OfficeError> {
        Ok(self.context.database.list_offices().await?)
    }

    /// Offices within `radius_in_km` of `center`, closest first.
    ///
    /// Falls back to the configured radius.
    pub async fn nearby(
        &self,
        center: Coordinates,
        radius_in_km: Option<f64>,
    ) -> Result<Vec<NearbyOffice>, OfficeError> {
        let radius = radius_in_km.unwrap_or(self.context.config.nearby_radius_in_km);

        let mut offices: Vec<_> = self
            .list()
            .await?
            .into_iter()
            .map(|office| NearbyOffice {
                distance_in_km: center.distance_in_km(&office.location),
                office,
            })
            .filter(|o| o.distance_in_km <= radius)
            .collect();

        offices.sort_by(|a, b| a.distance_in_km.total_cmp(&b.distance_in_km));

        Ok(offices)
    }

    pub async fn create(
        &self,
        actor: &Actor,
        new_office: NewPlainOffice,
    ) -> Result<OfficeData, OfficeError> {
        authorize(actor, Action::CreateOffice, Resource::Global)?;

        let office = self
            .context
            .database
            .create_office(NewOffice {
                name: new_office.name,
                address: new_office.address,
                location: new_office.location,
                kind: new_office.kind,
                admin_id: Some(actor.user_id),
            })
            .await?;

        info!("Created office {} ({})", office.id, office.name);

        self.context
            .record(
                actor,
                ActivityAction::OfficeCreate,
                None,
                Some(office.id),
                format!("Created office {}", office.name),
            )
            .await;

        Ok(office)
    }

    /// The departments of an office
    pub async fn departments(
        &self,
        office_id: PrimaryKey,
    ) -> Result<Vec<DepartmentData>, OfficeError> {
        // Ensure office exists
        let _ = self.context.database.office_by_id(office_id).await?;

        Ok(self.context.database.list_departments(office_id).await?)
    }

    /// Adds a department to an office, with an empty queue
    pub async fn create_department(
        &self,
        actor: &Actor,
        office_id: PrimaryKey,
        name: String,
        avg_wait_time_per_token: Option<u32>,
    ) -> Result<DepartmentData, OfficeError> {
        authorize(actor, Action::CreateDepartment, Resource::Office(office_id))?;

        let department = self
            .context
            .database
            .create_department(NewDepartment {
                office_id,
                name,
                avg_wait_time_per_token: avg_wait_time_per_token
                    .unwrap_or(self.context.config.default_avg_wait_per_token),
            })
            .await?;

        self.context
            .record(
                actor,
                ActivityAction::DepartmentCreate,
                Some(department.id),
                Some(office_id),
                format!("Created department {}", department.name),
            )
            .await;

        Ok(department)
    }
}

#[cfg(test)]
mod tests {
    use waitwise_core::Role;

    use super::*;
    use crate::testing::{collab, user};

    fn office(name: &str, lat: f64, lng: f64) -> NewPlainOffice {
        NewPlainOffice {
            name: name.to_string(),
            address: "Somewhere".to_string(),
            location: Coordinates::new(lat, lng),
            kind: OfficeKind::Rto,
        }
    }

    #[tokio::test]
    async fn nearby_sorts_by_distance() {
        let (collab, _) = collab();
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        let offices = &collab.offices;
        offices
            .create(&admin.actor(), office("Whitefield", 12.9698, 77.7500))
            .await
            .unwrap();
        offices
            .create(&admin.actor(), office("Jayanagar", 12.9250, 77.5938))
            .await
            .unwrap();
        offices
            .create(&admin.actor(), office("Chennai", 13.0827, 80.2707))
            .await
            .unwrap();

        let center = Coordinates::new(12.9716, 77.5946);

        let names: Vec<_> = offices
            .nearby(center, None)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.office.name)
            .collect();
        assert_eq!(names, vec!["Jayanagar", "Whitefield"]);

        let everything = offices.nearby(center, Some(500.)).await.unwrap();
        assert_eq!(everything.len(), 3);
        assert_eq!(everything[2].office.name, "Chennai");
    }

    #[tokio::test]
    async fn only_super_admins_create_offices() {
        let (collab, _) = collab();
        let alice = user(&collab, "alice@example.com", Role::User).await;

        let result = collab
            .offices
            .create(&alice.actor(), office("Nope", 0., 0.))
            .await;

        assert!(matches!(result, Err(OfficeError::Policy(_))));
        assert!(collab.offices.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn departments_start_empty() {
        let (collab, _) = collab();
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        let created = collab
            .offices
            .create(&admin.actor(), office("Branch", 12.9, 77.5))
            .await
            .unwrap();
        let department = collab
            .offices
            .create_department(&admin.actor(), created.id, "Loans".to_string(), None)
            .await
            .unwrap();

        assert_eq!(department.avg_wait_time_per_token, 10);
        assert_eq!(department.ledger.current_token, 0);
        assert_eq!(department.ledger.total_tokens, 0);

        let listed = collab.offices.departments(created.id).await.unwrap();
        assert_eq!(listed.len(), 1);

        let missing = collab.offices.departments(created.id + 100).await;
        assert!(matches!(
            missing,
            Err(OfficeError::Db(DatabaseError::NotFound { .. }))
        ));
    }
}
